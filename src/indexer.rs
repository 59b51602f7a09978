//! Plane↔IFD indexer (component F, §4.F): maps `(PlaneSelection, level)`
//! to the IFD the reader must consult for that plane's pixels.
//!
//! Two concerns are kept separate because only one of them touches I/O:
//! [`filter_multi_file_pixels`] is a pure function over the parsed OME
//! model (testable without a byte source), while [`Indexer::build`] walks
//! the open file's IFD chain to run pyramid detection (§4.F.1), which
//! needs to read candidate SubIFDs to learn their dimensions.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;
use crate::io::ByteSource;
use crate::ome::{OmeDocument, OmePixels, PlaneSelection, PyramidInfo};
use crate::tiff::{Ifd, TiffReader};

/// Partition an image's declared `TiffData` entries into "local" (this
/// file) and "remote" (another file in the same OME dataset), and build
/// the explicit lookup table multi-file OME-TIFF requires (§4.F.2).
///
/// Returns `(pixels, None)` unchanged when every entry is local (the
/// common single-file case, where the indexer instead computes IFD
/// indices directly from `DimensionOrder`).
pub fn filter_multi_file_pixels(
    pixels: &OmePixels,
    root_uuid: Option<&str>,
) -> (OmePixels, Option<HashMap<(usize, usize, usize), usize>>) {
    let is_local = |uuid: &Option<String>| uuid.is_none() || uuid.as_deref() == root_uuid;
    let has_remote = pixels.tiff_data.iter().any(|e| !is_local(&e.uuid));
    if !has_remote {
        return (pixels.clone(), None);
    }

    let local: Vec<_> = pixels
        .tiff_data
        .iter()
        .filter(|e| is_local(&e.uuid))
        .cloned()
        .collect();

    let mut local_cs: Vec<usize> = local.iter().map(|e| e.first_c).collect();
    local_cs.sort_unstable();
    local_cs.dedup();
    let mut local_zs: Vec<usize> = local.iter().map(|e| e.first_z).collect();
    local_zs.sort_unstable();
    local_zs.dedup();
    let mut local_ts: Vec<usize> = local.iter().map(|e| e.first_t).collect();
    local_ts.sort_unstable();
    local_ts.dedup();

    let mut lookup = HashMap::with_capacity(local.len());
    for entry in &local {
        let lc = local_cs.binary_search(&entry.first_c).unwrap();
        let lz = local_zs.binary_search(&entry.first_z).unwrap();
        let lt = local_ts.binary_search(&entry.first_t).unwrap();
        lookup.insert((lc, lz, lt), entry.ifd);
    }

    let channels = local_cs
        .iter()
        .filter_map(|&c| pixels.channels.get(c).cloned())
        .collect();

    let filtered = OmePixels {
        size_z: local_zs.len() as u32,
        size_c: local_cs.len() as u32,
        size_t: local_ts.len() as u32,
        channels,
        tiff_data: local,
        ..pixels.clone()
    };

    (filtered, Some(lookup))
}

/// A built indexer: the (possibly multi-file-filtered) pixel model, the
/// detected pyramid, and enough of the main IFD chain to resolve any
/// `(PlaneSelection, level)` without re-walking the file.
pub struct Indexer {
    pixels: OmePixels,
    pyramid: PyramidInfo,
    main_chain_offsets: Vec<u64>,
    local_lookup: Option<HashMap<(usize, usize, usize), usize>>,
    planes_per_image: usize,
}

impl Indexer {
    /// Build an indexer for the currently-open file, given its parsed
    /// OME-XML document (§4.F.1, §4.F.2).
    pub async fn build<S: ByteSource>(
        reader: &TiffReader<S>,
        doc: &OmeDocument,
        cancel: Option<&CancellationToken>,
    ) -> Result<Self, BridgeError> {
        let main_chain = reader.read_main_chain(cancel).await?;
        if main_chain.is_empty() {
            return Err(BridgeError::UnsupportedTagCombination(
                "file has no IFDs".to_string(),
            ));
        }

        let nominal = doc
            .images
            .first()
            .ok_or_else(|| BridgeError::InvalidXml("OME-XML has no Image element".to_string()))?;
        let (pixels, local_lookup) =
            filter_multi_file_pixels(&nominal.pixels, doc.root_uuid.as_deref());

        let pyramid = detect_pyramid(reader, &main_chain, doc, cancel).await?;
        let planes_per_image = pixels.planes_per_image().max(1);
        let main_chain_offsets = main_chain.iter().map(|ifd| ifd.offset).collect();

        Ok(Self {
            pixels,
            pyramid,
            main_chain_offsets,
            local_lookup,
            planes_per_image,
        })
    }

    pub fn pixels(&self) -> &OmePixels {
        &self.pixels
    }

    pub fn pyramid(&self) -> &PyramidInfo {
        &self.pyramid
    }

    fn base_chain_index(&self, selection: PlaneSelection) -> Result<usize, BridgeError> {
        if let Some(lookup) = &self.local_lookup {
            lookup
                .get(&(selection.c, selection.z, selection.t))
                .copied()
                .ok_or(BridgeError::NoSuchPlane {
                    c: selection.c,
                    z: selection.z,
                    t: selection.t,
                })
        } else {
            if selection.c >= self.pixels.size_c as usize
                || selection.z >= self.pixels.size_z as usize
                || selection.t >= self.pixels.size_t as usize
            {
                return Err(BridgeError::NoSuchPlane {
                    c: selection.c,
                    z: selection.z,
                    t: selection.t,
                });
            }
            Ok(self.pixels.dimension_order.plane_to_ifd(
                selection.c,
                selection.z,
                selection.t,
                self.pixels.size_c as usize,
                self.pixels.size_z as usize,
                self.pixels.size_t as usize,
            ))
        }
    }

    /// Resolve `(selection, level)` to the IFD a caller should read pixel
    /// data from (§4.F.3).
    pub async fn ifd_for<S: ByteSource>(
        &self,
        reader: &TiffReader<S>,
        selection: PlaneSelection,
        level: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Ifd, BridgeError> {
        if level >= self.pyramid.levels {
            return Err(BridgeError::NoSuchLevel(level));
        }

        let base_chain_index = self.base_chain_index(selection)?;
        let base_offset = *self
            .main_chain_offsets
            .get(base_chain_index)
            .ok_or(BridgeError::NoSuchPlane {
                c: selection.c,
                z: selection.z,
                t: selection.t,
            })?;

        if level == 0 {
            return reader.read_ifd_at(base_offset, cancel).await;
        }

        if self.pyramid.uses_sub_ifds {
            let base_ifd = reader.read_ifd_at(base_offset, cancel).await?;
            let sub_offsets = base_ifd
                .directory
                .sub_ifd_offsets()
                .ok_or(BridgeError::NoSuchLevel(level))?;
            let sub_offset = sub_offsets
                .get(level - 1)
                .copied()
                .ok_or(BridgeError::NoSuchLevel(level))?;
            reader.read_ifd_at(sub_offset, cancel).await
        } else {
            let chain_index = base_chain_index + level * self.planes_per_image;
            let offset = self
                .main_chain_offsets
                .get(chain_index)
                .copied()
                .ok_or(BridgeError::NoSuchLevel(level))?;
            reader.read_ifd_at(offset, cancel).await
        }
    }
}

/// Run the three pyramid-detection strategies in order (§4.F.1).
async fn detect_pyramid<S: ByteSource>(
    reader: &TiffReader<S>,
    main_chain: &[Ifd],
    doc: &OmeDocument,
    cancel: Option<&CancellationToken>,
) -> Result<PyramidInfo, BridgeError> {
    let base = &main_chain[0];
    let base_width = base
        .directory
        .image_width()
        .ok_or_else(|| BridgeError::UnsupportedTagCombination("IFD missing ImageWidth".to_string()))?;
    let base_height = base
        .directory
        .image_height()
        .ok_or_else(|| BridgeError::UnsupportedTagCombination("IFD missing ImageLength".to_string()))?;

    // Strategy 1: SubIFD pyramid.
    if let Some(sub_offsets) = base.directory.sub_ifd_offsets() {
        if !sub_offsets.is_empty() {
            let mut widths = vec![base_width];
            let mut heights = vec![base_height];
            for offset in &sub_offsets {
                let sub = reader.read_ifd_at(*offset, cancel).await?;
                widths.push(sub.directory.image_width().ok_or_else(|| {
                    BridgeError::UnsupportedTagCombination("SubIFD missing ImageWidth".to_string())
                })?);
                heights.push(sub.directory.image_height().ok_or_else(|| {
                    BridgeError::UnsupportedTagCombination("SubIFD missing ImageLength".to_string())
                })?);
            }
            return Ok(PyramidInfo {
                levels: widths.len(),
                uses_sub_ifds: true,
                widths,
                heights,
            });
        }
    }

    // Strategy 2: legacy OME pyramid (N > 1 declared Image entries).
    if doc.images.len() > 1 {
        let widths = doc.images.iter().map(|img| img.pixels.size_x).collect();
        let heights = doc.images.iter().map(|img| img.pixels.size_y).collect();
        return Ok(PyramidInfo {
            levels: doc.images.len(),
            uses_sub_ifds: false,
            widths,
            heights,
        });
    }

    // Strategy 3: cloud-optimised overview chain (strictly decreasing dims).
    if main_chain.len() > 1 {
        let mut strictly_decreasing = true;
        for pair in main_chain.windows(2) {
            let dims = (
                pair[0].directory.image_width(),
                pair[0].directory.image_height(),
                pair[1].directory.image_width(),
                pair[1].directory.image_height(),
            );
            match dims {
                (Some(w0), Some(h0), Some(w1), Some(h1)) if w1 < w0 && h1 < h0 => {}
                _ => {
                    strictly_decreasing = false;
                    break;
                }
            }
        }
        if strictly_decreasing {
            let widths = main_chain
                .iter()
                .filter_map(|ifd| ifd.directory.image_width())
                .collect();
            let heights = main_chain
                .iter()
                .filter_map(|ifd| ifd.directory.image_height())
                .collect();
            return Ok(PyramidInfo {
                levels: main_chain.len(),
                uses_sub_ifds: false,
                widths,
                heights,
            });
        }
    }

    Ok(PyramidInfo {
        levels: 1,
        uses_sub_ifds: false,
        widths: vec![base_width],
        heights: vec![base_height],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ome::{DimensionOrder, OmeChannel, TiffDataEntry};

    fn base_pixels() -> OmePixels {
        OmePixels {
            size_x: 64,
            size_y: 64,
            size_z: 1,
            size_c: 2,
            size_t: 20,
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
            channels: vec![OmeChannel::default_for_index(0), OmeChannel::default_for_index(1)],
            tiff_data: Vec::new(),
        }
    }

    #[test]
    fn single_file_pixels_are_unchanged() {
        let mut pixels = base_pixels();
        pixels.tiff_data = vec![TiffDataEntry {
            first_c: 0,
            first_z: 0,
            first_t: 0,
            ifd: 0,
            plane_count: 1,
            uuid: None,
            file_name: None,
        }];
        let (filtered, lookup) = filter_multi_file_pixels(&pixels, None);
        assert!(lookup.is_none());
        assert_eq!(filtered.size_c, pixels.size_c);
    }

    #[test]
    fn s5_multi_file_routing_matches_scenario() {
        let mut pixels = base_pixels();
        let root_uuid = "U_L";
        let mut entries = Vec::new();
        for t in 0..20usize {
            entries.push(TiffDataEntry {
                first_c: 0,
                first_z: 0,
                first_t: t,
                ifd: t,
                plane_count: 1,
                uuid: Some("U_L".to_string()),
                file_name: Some("local.tif".to_string()),
            });
        }
        for t in 0..20usize {
            entries.push(TiffDataEntry {
                first_c: 1,
                first_z: 0,
                first_t: t,
                ifd: t,
                plane_count: 1,
                uuid: Some("U_R".to_string()),
                file_name: Some("remote.tif".to_string()),
            });
        }
        pixels.tiff_data = entries;

        let (filtered, lookup) = filter_multi_file_pixels(&pixels, Some(root_uuid));
        let lookup = lookup.expect("multi-file lookup expected");

        assert_eq!(filtered.size_c, 1);
        assert_eq!(filtered.size_z, 1);
        assert_eq!(filtered.size_t, 20);
        assert_eq!(filtered.channels.len(), 1);
        assert_eq!(filtered.channels[0].id, "Channel:0:0");
        assert_eq!(lookup.len(), 20);
        for t in 0..20usize {
            assert_eq!(lookup.get(&(0, 0, t)), Some(&t));
        }
    }
}
