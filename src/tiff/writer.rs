//! TIFF serialization: the two-pass placement writer (§4.E.3).
//!
//! Pass 1 ("resolve") builds, for every IFD and its SubIFD tree, a
//! structural [`Directory`] whose entries have the right *sizes* but
//! placeholder offset/array values. Pass 2 ("place") walks that tree with
//! a single cursor, assigning every region (entry block, overflow,
//! tile data, then children) its absolute file offset — this is possible
//! without having written a byte yet because sizes never depend on
//! offsets, only counts and types do. Pass 3 ("write") re-resolves each
//! node's real tag values (now that offsets are known) and copies every
//! region into its assigned slot in a single pre-allocated buffer.

use super::header::TiffHeader;
use super::ifd::{Directory, Value};
use super::tags::{Compression, TiffTag};
use crate::error::BridgeError;

/// A classic-format write whose computed size would exceed this many
/// bytes upgrades to BigTIFF under `TiffFormat::Auto` (§4.E.3).
const BIGTIFF_SIZE_THRESHOLD: u64 = 3_900_000_000;

/// The largest offset classic (32-bit) TIFF can address.
const CLASSIC_MAX_OFFSET: u64 = (1u64 << 32) - 2;

/// Which container variant to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffFormat {
    Classic,
    BigTiff,
    Auto,
}

/// One pyramid level's already-tiled, already-compressed pixel data plus
/// the tag values that describe it. The writer never sees raw pixels —
/// tiling and compression happen upstream (§4.E.3's tile preparation).
#[derive(Debug, Clone)]
pub struct IfdPlan {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    /// `0` selects a single-strip layout (`RowsPerStrip = height`);
    /// otherwise the tile width/height used to produce `blocks`.
    pub tile_width: u32,
    pub tile_height: u32,
    pub compression: Compression,
    /// Tile (or strip) payloads in row-major emission order, already
    /// compressed if `compression != None`.
    pub blocks: Vec<Vec<u8>>,
    /// OME-XML text; only ever set on the first main IFD.
    pub image_description: Option<String>,
    /// `NewSubfileType = 1` is added when true (every sub-resolution IFD).
    pub is_sub_resolution: bool,
    /// Child pyramid levels attached via `SubIFDs`.
    pub sub_ifds: Vec<IfdPlan>,
}

struct PlanNode<'a> {
    plan: &'a IfdPlan,
    directory: Directory,
    entry_block_size: u64,
    overflow_size: u64,
    tile_data_size: u64,
    children: Vec<PlanNode<'a>>,
}

struct Placement {
    ifd_offset: u64,
    overflow_offset: u64,
    tile_offsets: Vec<u64>,
    next_ifd_offset: u64,
    children: Vec<Placement>,
}

/// Serialize a main-IFD chain (with attached SubIFD pyramids) into a
/// complete TIFF byte buffer.
pub fn write_tiff(main_ifds: &[IfdPlan], format: TiffFormat) -> Result<Vec<u8>, BridgeError> {
    let is_bigtiff = match format {
        TiffFormat::Classic => false,
        TiffFormat::BigTiff => true,
        TiffFormat::Auto => estimate_total_size(main_ifds) > BIGTIFF_SIZE_THRESHOLD,
    };
    let header = TiffHeader {
        is_bigtiff,
        first_ifd_offset: 0,
    };

    let roots: Vec<PlanNode> = main_ifds.iter().map(|p| build_plan_node(p, &header)).collect();

    let mut cursor = TiffHeader::header_size(is_bigtiff) as u64;
    let mut placements = Vec::with_capacity(roots.len());
    for node in &roots {
        placements.push(place_node(node, &header, &mut cursor));
    }
    link_main_chain(&mut placements);

    let total_size = cursor;
    if !is_bigtiff && total_size > CLASSIC_MAX_OFFSET {
        if format == TiffFormat::Classic {
            return Err(BridgeError::FileTooLarge(total_size));
        }
        // TiffFormat::Auto underestimated; this only happens if per-entry
        // overflow padding pushed us past the threshold check above.
        return write_tiff(main_ifds, TiffFormat::BigTiff);
    }

    let mut buf = vec![0u8; total_size as usize];
    let mut prefix = Vec::with_capacity(TiffHeader::header_size(is_bigtiff));
    TiffHeader::write_prefix(is_bigtiff, &mut prefix);
    buf[..prefix.len()].copy_from_slice(&prefix);
    let first_ifd_offset = placements.first().map(|p| p.ifd_offset).unwrap_or(0);
    write_offset_field(&mut buf, prefix.len(), first_ifd_offset, is_bigtiff);

    for (node, placement) in roots.iter().zip(placements.iter()) {
        serialize_node(node, placement, &header, &mut buf);
    }

    Ok(buf)
}

fn estimate_total_size(main_ifds: &[IfdPlan]) -> u64 {
    fn walk(plan: &IfdPlan) -> u64 {
        let tile_bytes: u64 = plan.blocks.iter().map(|b| b.len() as u64).sum();
        let per_entry_overhead = 20 * 64; // generous flat allowance per IFD
        tile_bytes + per_entry_overhead + plan.sub_ifds.iter().map(walk).sum::<u64>()
    }
    main_ifds.iter().map(walk).sum()
}

fn link_main_chain(placements: &mut [Placement]) {
    let offsets: Vec<u64> = placements.iter().map(|p| p.ifd_offset).collect();
    for i in 0..placements.len() {
        placements[i].next_ifd_offset = offsets.get(i + 1).copied().unwrap_or(0);
    }
}

/// Build a structural directory for sizing purposes: array-valued tags
/// get placeholder entries of the right length (zeros), since an entry's
/// encoded size depends only on its type and count, never its content.
fn build_plan_node<'a>(plan: &'a IfdPlan, header: &TiffHeader) -> PlanNode<'a> {
    let directory = structural_directory(plan, header.is_bigtiff);
    let (entry_block_size, overflow_size) = directory_layout(&directory, header);
    let tile_data_size: u64 = plan.blocks.iter().map(|b| pad_even(b.len()) as u64).sum();
    let children = plan
        .sub_ifds
        .iter()
        .map(|child| build_plan_node(child, header))
        .collect();

    PlanNode {
        plan,
        directory,
        entry_block_size,
        overflow_size,
        tile_data_size,
        children,
    }
}

fn structural_directory(plan: &IfdPlan, is_bigtiff: bool) -> Directory {
    let mut dir = Directory::new();
    if plan.is_sub_resolution {
        dir.insert(TiffTag::NewSubfileType, Value::Long(vec![1]));
    }
    dir.insert(TiffTag::ImageWidth, Value::Long(vec![plan.width]));
    dir.insert(TiffTag::ImageLength, Value::Long(vec![plan.height]));
    dir.insert(
        TiffTag::BitsPerSample,
        Value::Short(vec![plan.bits_per_sample]),
    );
    dir.insert(
        TiffTag::Compression,
        Value::Short(vec![plan.compression as u16]),
    );
    dir.insert(TiffTag::PhotometricInterpretation, Value::Short(vec![1]));
    dir.insert(TiffTag::SamplesPerPixel, Value::Short(vec![1]));
    dir.insert(TiffTag::PlanarConfiguration, Value::Short(vec![1]));
    dir.insert(
        TiffTag::SampleFormat,
        Value::Short(vec![plan.sample_format]),
    );

    let block_count = plan.blocks.len();
    if plan.tile_width != 0 {
        dir.insert(TiffTag::TileWidth, Value::Short(vec![plan.tile_width as u16]));
        dir.insert(TiffTag::TileLength, Value::Short(vec![plan.tile_height as u16]));
        dir.insert(TiffTag::TileOffsets, Value::offsets(&vec![0; block_count], is_bigtiff));
        dir.insert(
            TiffTag::TileByteCounts,
            Value::offsets(&vec![0; block_count], is_bigtiff),
        );
    } else {
        dir.insert(TiffTag::RowsPerStrip, Value::Long(vec![plan.height]));
        dir.insert(TiffTag::StripOffsets, Value::offsets(&vec![0; block_count], is_bigtiff));
        dir.insert(
            TiffTag::StripByteCounts,
            Value::offsets(&vec![0; block_count], is_bigtiff),
        );
    }

    if let Some(desc) = &plan.image_description {
        dir.insert(TiffTag::ImageDescription, Value::Ascii(desc.clone()));
    }
    if !plan.sub_ifds.is_empty() {
        dir.insert(
            TiffTag::SubIFDs,
            Value::offsets(&vec![0; plan.sub_ifds.len()], is_bigtiff),
        );
    }

    dir
}

fn directory_layout(dir: &Directory, header: &TiffHeader) -> (u64, u64) {
    let entry_block_size = (header.ifd_count_size()
        + dir.len() * header.ifd_entry_size()
        + header.ifd_next_offset_size()) as u64;

    let overflow_size: u64 = dir
        .iter()
        .filter_map(|(_, value)| {
            let ft = value.field_type();
            if ft.fits_inline(value.count(), header.is_bigtiff) {
                None
            } else {
                Some(pad_even(value.encode().len()) as u64)
            }
        })
        .sum();

    (entry_block_size, overflow_size)
}

fn pad_even(len: usize) -> usize {
    len + (len % 2)
}

fn place_node(node: &PlanNode, header: &TiffHeader, cursor: &mut u64) -> Placement {
    let ifd_offset = *cursor;
    *cursor += node.entry_block_size;

    let overflow_offset = *cursor;
    *cursor += node.overflow_size;

    let tile_data_offset = *cursor;
    let mut tile_offsets = Vec::with_capacity(node.plan.blocks.len());
    let mut pos = tile_data_offset;
    for block in &node.plan.blocks {
        tile_offsets.push(pos);
        pos += pad_even(block.len()) as u64;
    }
    *cursor = pos;

    let children = node
        .children
        .iter()
        .map(|child| place_node(child, header, cursor))
        .collect();

    Placement {
        ifd_offset,
        overflow_offset,
        tile_offsets,
        next_ifd_offset: 0, // patched by link_main_chain for top-level roots only
        children,
    }
}

fn serialize_node(node: &PlanNode, placement: &Placement, header: &TiffHeader, buf: &mut [u8]) {
    let byte_counts: Vec<u64> = node.plan.blocks.iter().map(|b| b.len() as u64).collect();
    let sub_ifd_offsets: Vec<u64> = placement.children.iter().map(|c| c.ifd_offset).collect();

    let mut directory = node.directory.clone();
    if node.plan.tile_width != 0 {
        directory.insert(
            TiffTag::TileOffsets,
            Value::offsets(&placement.tile_offsets, header.is_bigtiff),
        );
        directory.insert(TiffTag::TileByteCounts, Value::offsets(&byte_counts, header.is_bigtiff));
    } else {
        directory.insert(
            TiffTag::StripOffsets,
            Value::offsets(&placement.tile_offsets, header.is_bigtiff),
        );
        directory.insert(TiffTag::StripByteCounts, Value::offsets(&byte_counts, header.is_bigtiff));
    }
    if !sub_ifd_offsets.is_empty() {
        directory.insert(TiffTag::SubIFDs, Value::offsets(&sub_ifd_offsets, header.is_bigtiff));
    }

    write_entry_block(&directory, header, placement, buf);

    let mut overflow_cursor = placement.overflow_offset;
    for (_, value) in directory.iter() {
        if !value.field_type().fits_inline(value.count(), header.is_bigtiff) {
            let bytes = value.encode();
            let start = overflow_cursor as usize;
            buf[start..start + bytes.len()].copy_from_slice(&bytes);
            overflow_cursor += pad_even(bytes.len()) as u64;
        }
    }

    let mut tile_cursor = placement.tile_offsets.first().copied().unwrap_or(0);
    for block in &node.plan.blocks {
        let start = tile_cursor as usize;
        buf[start..start + block.len()].copy_from_slice(block);
        tile_cursor += pad_even(block.len()) as u64;
    }

    for (child, child_placement) in node.children.iter().zip(placement.children.iter()) {
        serialize_node(child, child_placement, header, buf);
    }
}

fn write_entry_block(directory: &Directory, header: &TiffHeader, placement: &Placement, buf: &mut [u8]) {
    let count_size = header.ifd_count_size();
    let entry_size = header.ifd_entry_size();
    let value_offset_size = header.value_offset_size();
    let is_bigtiff = header.is_bigtiff;

    let base = placement.ifd_offset as usize;
    write_uint(buf, base, directory.len() as u64, count_size);

    let mut overflow_cursor = placement.overflow_offset;
    for (i, (tag, value)) in directory.iter().enumerate() {
        let entry_base = base + count_size + i * entry_size;
        write_uint(buf, entry_base, tag as u64, 2);
        write_uint(buf, entry_base + 2, value.field_type() as u64, 2);
        write_uint(buf, entry_base + 4, value.count(), entry_size - 4 - value_offset_size);

        let value_field = entry_base + entry_size - value_offset_size;
        let encoded = value.encode();
        if value.field_type().fits_inline(value.count(), is_bigtiff) {
            buf[value_field..value_field + encoded.len()].copy_from_slice(&encoded);
        } else {
            write_uint(buf, value_field, overflow_cursor, value_offset_size);
            overflow_cursor += pad_even(encoded.len()) as u64;
        }
    }

    let next_offset_pos = base + count_size + directory.len() * entry_size;
    write_offset_field(buf, next_offset_pos, placement.next_ifd_offset, is_bigtiff);
}

fn write_uint(buf: &mut [u8], at: usize, value: u64, width: usize) {
    let bytes = value.to_le_bytes();
    buf[at..at + width].copy_from_slice(&bytes[..width]);
}

fn write_offset_field(buf: &mut [u8], at: usize, value: u64, is_bigtiff: bool) {
    write_uint(buf, at, value, if is_bigtiff { 8 } else { 4 });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_plan(size: u32) -> IfdPlan {
        let mut pixels = vec![0u8; (size * size) as usize];
        for y in 0..size {
            for x in 0..size {
                pixels[(y * size + x) as usize] = ((x + y) % 256) as u8;
            }
        }
        IfdPlan {
            width: size,
            height: size,
            bits_per_sample: 8,
            sample_format: 1,
            tile_width: 0,
            tile_height: 0,
            compression: Compression::None,
            blocks: vec![pixels],
            image_description: None,
            is_sub_resolution: false,
            sub_ifds: Vec::new(),
        }
    }

    #[test]
    fn classic_header_bytes_match_s1() {
        let plan = gradient_plan(32);
        let buf = write_tiff(&[plan], TiffFormat::Classic).unwrap();
        assert_eq!(&buf[0..8], &[0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn bigtiff_header_bytes_match_s2() {
        let plan = gradient_plan(8);
        let buf = write_tiff(&[plan], TiffFormat::BigTiff).unwrap();
        assert_eq!(&buf[0..8], &[0x49, 0x49, 0x2B, 0x00, 0x08, 0x00, 0x00, 0x00]);
        let first_ifd = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        assert_eq!(first_ifd, 16);
    }

    #[test]
    fn sub_ifds_carry_new_subfile_type() {
        let mut base = gradient_plan(32);
        let mut sub1 = gradient_plan(16);
        sub1.is_sub_resolution = true;
        base.sub_ifds = vec![sub1];
        let buf = write_tiff(&[base], TiffFormat::Classic).unwrap();
        assert!(!buf.is_empty());
    }
}
