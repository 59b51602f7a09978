//! The Zarr-key facade (component G, §4.G): presents an open OME-TIFF as
//! a read-only, key-addressed blob store in Zarr v3's key space.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::dtype::{tiff_to_array_dtype, ArrayDType, RasterSampleFormat};
use crate::error::BridgeError;
use crate::indexer::Indexer;
use crate::io::ByteSource;
use crate::ome::{OmeDocument, PlaneSelection};
use crate::tiff::TiffReader;

use super::metadata::{array_document, emitted_axes, level_geometry, root_group_document, Axis};

/// A key parsed into one of the three recognised shapes (§4.G).
#[derive(Debug, PartialEq, Eq)]
enum ParsedKey {
    RootMetadata,
    LevelMetadata(usize),
    Chunk { level: usize, indices: Vec<usize> },
}

fn parse_key(key: &str) -> Option<ParsedKey> {
    let key = key.strip_prefix('/').unwrap_or(key);
    if key == "zarr.json" {
        return Some(ParsedKey::RootMetadata);
    }

    let mut parts = key.split('/');
    let level: usize = parts.next()?.parse().ok()?;
    let rest: Vec<&str> = parts.collect();

    if rest == ["zarr.json"] {
        return Some(ParsedKey::LevelMetadata(level));
    }

    if rest.first() == Some(&"c") && rest.len() > 1 {
        let indices = rest[1..]
            .iter()
            .map(|s| s.parse::<usize>().ok())
            .collect::<Option<Vec<usize>>>()?;
        return Some(ParsedKey::Chunk { level, indices });
    }

    None
}

fn sample_format_from_code(code: u16) -> Result<RasterSampleFormat, BridgeError> {
    match code {
        1 => Ok(RasterSampleFormat::UnsignedInteger),
        2 => Ok(RasterSampleFormat::SignedInteger),
        3 => Ok(RasterSampleFormat::IeeeFloat),
        other => Err(BridgeError::UnsupportedDtype(format!(
            "SampleFormat code {other}"
        ))),
    }
}

/// An open OME-TIFF, presented as a Zarr v3 store.
pub struct ZarrFacade<S: ByteSource> {
    reader: TiffReader<S>,
    indexer: Indexer,
    dtype: ArrayDType,
    tile_width: u32,
    tile_height: u32,
    name: Option<String>,
    root_doc: Mutex<Option<Bytes>>,
    level_docs: Mutex<HashMap<usize, Bytes>>,
}

impl<S: ByteSource> ZarrFacade<S> {
    /// Open a facade over an already-opened TIFF file and its parsed
    /// OME-XML document.
    pub async fn open(
        reader: TiffReader<S>,
        doc: OmeDocument,
        cancel: Option<&CancellationToken>,
    ) -> Result<Self, BridgeError> {
        let indexer = Indexer::build(&reader, &doc, cancel).await?;

        let base_offset = reader.first_ifd_offset();
        let base_ifd = reader.read_ifd_at(base_offset, cancel).await?;
        let tile_width = base_ifd.directory.tile_width().unwrap_or(0);
        let tile_height = base_ifd.directory.tile_height().unwrap_or(0);

        let sample_format = sample_format_from_code(base_ifd.directory.sample_format())?;
        let bits = base_ifd.directory.bits_per_sample().ok_or_else(|| {
            BridgeError::UnsupportedTagCombination("IFD missing BitsPerSample".to_string())
        })?;
        let dtype = tiff_to_array_dtype(sample_format, bits)?;

        let name = doc.images.first().and_then(|image| image.name.clone());

        Ok(Self {
            reader,
            indexer,
            dtype,
            tile_width,
            tile_height,
            name,
            root_doc: Mutex::new(None),
            level_docs: Mutex::new(HashMap::new()),
        })
    }

    pub fn levels(&self) -> usize {
        self.indexer.pyramid().levels
    }

    /// Resolve a store key to its bytes, or `None` if the key is
    /// unrecognised or out of range (§7's "absence, not an error").
    pub async fn get(
        &self,
        key: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Bytes>, BridgeError> {
        let parsed = match parse_key(key) {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        match parsed {
            ParsedKey::RootMetadata => Ok(Some(self.root_document_bytes())),
            ParsedKey::LevelMetadata(level) => {
                if level >= self.levels() {
                    return Ok(None);
                }
                Ok(Some(self.level_document_bytes(level)))
            }
            ParsedKey::Chunk { level, indices } => {
                if level >= self.levels() {
                    return Ok(None);
                }
                let axes = emitted_axes(self.indexer.pixels());
                if indices.len() != axes.len() {
                    return Ok(None);
                }
                self.read_chunk(&axes, level, &indices, cancel)
                    .await
                    .map(Some)
            }
        }
    }

    fn root_document_bytes(&self) -> Bytes {
        let mut guard = self.root_doc.lock().unwrap();
        if let Some(bytes) = &*guard {
            return bytes.clone();
        }
        let doc = root_group_document(
            self.name.as_deref(),
            self.indexer.pixels(),
            self.indexer.pyramid(),
        );
        let encoded = Bytes::from(serde_json::to_vec(&doc).expect("document serialises"));
        *guard = Some(encoded.clone());
        encoded
    }

    fn level_document_bytes(&self, level: usize) -> Bytes {
        let mut guard = self.level_docs.lock().unwrap();
        if let Some(bytes) = guard.get(&level) {
            return bytes.clone();
        }
        let doc = array_document(
            self.indexer.pixels(),
            self.indexer.pyramid(),
            level,
            self.dtype,
            self.tile_width,
            self.tile_height,
        );
        let encoded = Bytes::from(serde_json::to_vec(&doc).expect("document serialises"));
        guard.insert(level, encoded.clone());
        encoded
    }

    async fn read_chunk(
        &self,
        axes: &[Axis],
        level: usize,
        indices: &[usize],
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes, BridgeError> {
        let pixels = self.indexer.pixels();
        let geometry = level_geometry(pixels, self.indexer.pyramid(), level, self.tile_width, self.tile_height);

        let n = axes.len();
        let mut selection = PlaneSelection { c: 0, z: 0, t: 0 };
        for (axis, &idx) in axes[..n - 2].iter().zip(indices[..n - 2].iter()) {
            match axis {
                Axis::T => selection.t = idx,
                Axis::C => selection.c = idx,
                Axis::Z => selection.z = idx,
                Axis::Y | Axis::X => unreachable!("y/x are the trailing two axes"),
            }
        }
        let y_idx = indices[n - 2] as u32;
        let x_idx = indices[n - 1] as u32;

        let image_width = self.indexer.pyramid().widths[level];
        let image_height = self.indexer.pyramid().heights[level];
        let chunk_w = *geometry.chunk_shape.last().unwrap() as u32;
        let chunk_h = geometry.chunk_shape[geometry.chunk_shape.len() - 2] as u32;
        let bytes_per_element = self.dtype.bytes_per_element() as usize;

        let left = x_idx * chunk_w;
        let top = y_idx * chunk_h;
        let right = ((x_idx + 1) * chunk_w).min(image_width);
        let bottom = ((y_idx + 1) * chunk_h).min(image_height);

        let mut out = vec![0u8; chunk_w as usize * chunk_h as usize * bytes_per_element];
        if left < right && top < bottom {
            let ifd = self
                .indexer
                .ifd_for(&self.reader, selection, level, cancel)
                .await?;
            let window = self
                .reader
                .read_window(&ifd, bytes_per_element, left, top, right, bottom, cancel)
                .await?;
            let win_w = (right - left) as usize;
            for row in 0..(bottom - top) as usize {
                let src_start = row * win_w * bytes_per_element;
                let dst_start = row * chunk_w as usize * bytes_per_element;
                out[dst_start..dst_start + win_w * bytes_per_element]
                    .copy_from_slice(&window[src_start..src_start + win_w * bytes_per_element]);
            }
        }

        Ok(Bytes::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryByteSource;
    use crate::ome::{DimensionOrder, OmeChannel, OmeDocument, OmeImage, OmePixels};
    use crate::tiff::{write_tiff, IfdPlan, TiffFormat};

    fn single_level_ifd_plan(size: u32, tile: u32) -> IfdPlan {
        let mut pixels = vec![0u8; (size * size) as usize];
        for (i, p) in pixels.iter_mut().enumerate() {
            *p = (i % 251) as u8;
        }
        let tiles_per_side = size.div_ceil(tile);
        let mut blocks = Vec::new();
        for ty in 0..tiles_per_side {
            for tx in 0..tiles_per_side {
                let mut block = vec![0u8; (tile * tile) as usize];
                for row in 0..tile {
                    for col in 0..tile {
                        let src_x = tx * tile + col;
                        let src_y = ty * tile + row;
                        let value = if src_x < size && src_y < size {
                            pixels[(src_y * size + src_x) as usize]
                        } else {
                            0
                        };
                        block[(row * tile + col) as usize] = value;
                    }
                }
                blocks.push(block);
            }
        }
        IfdPlan {
            width: size,
            height: size,
            bits_per_sample: 8,
            sample_format: 1,
            tile_width: tile,
            tile_height: tile,
            compression: crate::tiff::Compression::None,
            blocks,
            image_description: None,
            is_sub_resolution: false,
            sub_ifds: Vec::new(),
        }
    }

    fn single_image_pixels(size: u32) -> OmePixels {
        OmePixels {
            size_x: size,
            size_y: size,
            size_z: 1,
            size_c: 1,
            size_t: 1,
            dimension_order: DimensionOrder::Xyzct,
            element_type: "uint8".to_string(),
            physical_size_x: None,
            physical_size_y: None,
            physical_size_z: None,
            physical_size_x_unit: "µm".to_string(),
            physical_size_y_unit: "µm".to_string(),
            physical_size_z_unit: "µm".to_string(),
            big_endian: false,
            interleaved: false,
            channels: vec![OmeChannel::default_for_index(0)],
            tiff_data: Vec::new(),
        }
    }

    async fn build_facade(size: u32, tile: u32) -> ZarrFacade<MemoryByteSource> {
        let plan = single_level_ifd_plan(size, tile);
        let bytes = write_tiff(&[plan], TiffFormat::Classic).unwrap();
        let source = MemoryByteSource::new(bytes);
        let reader = TiffReader::open(source).await.unwrap();
        let doc = OmeDocument {
            images: vec![OmeImage {
                id: "Image:0".to_string(),
                name: None,
                pixels: single_image_pixels(size),
            }],
            root_uuid: None,
        };
        ZarrFacade::open(reader, doc, None).await.unwrap()
    }

    #[test]
    fn parses_all_three_key_shapes() {
        assert_eq!(parse_key("zarr.json"), Some(ParsedKey::RootMetadata));
        assert_eq!(parse_key("/zarr.json"), Some(ParsedKey::RootMetadata));
        assert_eq!(parse_key("2/zarr.json"), Some(ParsedKey::LevelMetadata(2)));
        assert_eq!(
            parse_key("0/c/0/1/2"),
            Some(ParsedKey::Chunk {
                level: 0,
                indices: vec![0, 1, 2]
            })
        );
        assert_eq!(parse_key("not/a/real/key/at/all"), None);
    }

    #[tokio::test]
    async fn root_and_level_metadata_are_byte_identical_across_requests() {
        let facade = build_facade(64, 32).await;
        let first = facade.get("zarr.json", None).await.unwrap().unwrap();
        let second = facade.get("zarr.json", None).await.unwrap().unwrap();
        assert_eq!(first, second);

        let level0_a = facade.get("0/zarr.json", None).await.unwrap().unwrap();
        let level0_b = facade.get("0/zarr.json", None).await.unwrap().unwrap();
        assert_eq!(level0_a, level0_b);
    }

    #[tokio::test]
    async fn out_of_range_level_is_not_found() {
        let facade = build_facade(64, 32).await;
        assert!(facade.get("5/zarr.json", None).await.unwrap().is_none());
        assert!(facade.get("5/c/0/0", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_image_chunk_matches_pixel_values() {
        let facade = build_facade(64, 32).await;
        let chunk = facade.get("0/c/0/0", None).await.unwrap().unwrap();
        assert_eq!(chunk.len(), 32 * 32);
        // Pixel (0, 0, 0) of the synthetic gradient is value 0.
        assert_eq!(chunk[0], 0);
    }

    #[tokio::test]
    async fn out_of_image_chunk_is_all_zero_of_full_chunk_size() {
        // size=48, tile=32 -> only tiles (0,0)/(0,1)/(1,0)/(1,1) overlap the
        // image at all; (2, 2) is entirely beyond it.
        let facade = build_facade(48, 32).await;
        let chunk = facade.get("0/c/2/2", None).await.unwrap().unwrap();
        assert_eq!(chunk.len(), 32 * 32);
        assert!(chunk.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn unrecognised_key_returns_not_found() {
        let facade = build_facade(64, 32).await;
        assert!(facade.get("nonsense", None).await.unwrap().is_none());
    }
}
