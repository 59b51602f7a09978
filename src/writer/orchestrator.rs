//! Write orchestrator (component H, §4.H): drives the dtype registry,
//! deflate codec, OME-XML generator, and TIFF writer forward to emit a
//! complete OME-TIFF from a plane source.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::compression::deflate;
use crate::dtype::{array_dtype_to_ome_type, array_dtype_to_tiff, ArrayDType, RasterSampleFormat};
use crate::error::BridgeError;
use crate::ome::{generate_ome_xml, DimensionOrder, GeneratorChannel, GeneratorInput};
use crate::tiff::{write_tiff, Compression, IfdPlan, TiffFormat};

use super::plane_reader::PlaneReader;

/// Default bounded concurrency for plane builds (§4.H step 4).
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// One pyramid level's dimensions for a write request. Level 0 is the
/// full-resolution image; `widths`/`heights` must strictly decrease.
#[derive(Debug, Clone, Copy)]
pub struct MultiscaleLevel {
    pub width: u32,
    pub height: u32,
}

/// Everything the orchestrator needs to emit a complete OME-TIFF (§4.H).
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub creator: String,
    pub name: String,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    pub dimension_order: DimensionOrder,
    pub dtype: ArrayDType,
    pub physical_size_x: Option<f64>,
    pub physical_size_y: Option<f64>,
    pub physical_size_z: Option<f64>,
    pub physical_size_x_unit_name: Option<String>,
    pub physical_size_y_unit_name: Option<String>,
    pub physical_size_z_unit_name: Option<String>,
    pub channels: Vec<GeneratorChannel>,
    /// Level 0 first, each subsequent level strictly smaller.
    pub levels: Vec<MultiscaleLevel>,
    /// `0` selects a single-strip layout per IFD.
    pub tile_width: u32,
    pub tile_height: u32,
    pub compression: Compression,
    /// Only consulted when `compression` is `Deflate`/`AdobeDeflate`.
    pub deflate_level: Option<u32>,
    pub format: TiffFormat,
    pub max_concurrency: usize,
}

/// Produce a complete OME-TIFF byte buffer from `request`, reading pixel
/// planes through `plane_reader` (§4.H).
pub async fn write_ome_tiff<P>(
    request: WriteRequest,
    plane_reader: Arc<P>,
    cancel: Option<CancellationToken>,
) -> Result<Vec<u8>, BridgeError>
where
    P: PlaneReader + 'static,
{
    let level0 = request
        .levels
        .first()
        .copied()
        .ok_or_else(|| BridgeError::UnsupportedTagCombination("write request has no levels".to_string()))?;

    let (sample_format, bits_per_sample) = array_dtype_to_tiff(request.dtype);
    let sample_format_code = sample_format_code(sample_format);

    let ome_xml = generate_ome_xml(&GeneratorInput {
        creator: request.creator.clone(),
        name: request.name.clone(),
        size_x: level0.width,
        size_y: level0.height,
        size_z: request.size_z,
        size_c: request.size_c,
        size_t: request.size_t,
        dimension_order: request.dimension_order,
        element_type: array_dtype_to_ome_type(request.dtype).to_string(),
        physical_size_x: request.physical_size_x,
        physical_size_y: request.physical_size_y,
        physical_size_z: request.physical_size_z,
        physical_size_x_unit_name: request.physical_size_x_unit_name.clone(),
        physical_size_y_unit_name: request.physical_size_y_unit_name.clone(),
        physical_size_z_unit_name: request.physical_size_z_unit_name.clone(),
        channels: request.channels.clone(),
    });

    let total_planes =
        request.size_c as usize * request.size_z as usize * request.size_t as usize;
    let semaphore = Arc::new(Semaphore::new(request.max_concurrency.max(1)));
    let request = Arc::new(request);

    // Spawn every plane build up front; each task waits on the semaphore
    // before doing any I/O, bounding actual concurrency. Handles are
    // collected in `k` order and awaited in that same order below, so the
    // emitted IFD order matches plane index `k` regardless of which
    // build finishes first (§5's ordering guarantee).
    let mut handles = Vec::with_capacity(total_planes);
    for k in 0..total_planes {
        let (c, z, t) = request.dimension_order.ifd_to_plane(
            k,
            request.size_c as usize,
            request.size_z as usize,
            request.size_t as usize,
        );
        let semaphore = semaphore.clone();
        let plane_reader = plane_reader.clone();
        let request = request.clone();
        let cancel = cancel.clone();
        let image_description = if k == 0 { Some(ome_xml.clone()) } else { None };

        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| BridgeError::Cancelled)?;
            build_ifd_plan(
                &request,
                plane_reader.as_ref(),
                c,
                z,
                t,
                sample_format_code,
                bits_per_sample,
                image_description,
                cancel.as_ref(),
            )
            .await
        }));
    }

    let mut main_ifds = Vec::with_capacity(total_planes);
    for handle in handles {
        let plan = handle.await.map_err(|_| BridgeError::Cancelled)??;
        main_ifds.push(plan);
    }

    write_tiff(&main_ifds, request.format)
}

fn sample_format_code(format: RasterSampleFormat) -> u16 {
    match format {
        RasterSampleFormat::UnsignedInteger => 1,
        RasterSampleFormat::SignedInteger => 2,
        RasterSampleFormat::IeeeFloat => 3,
    }
}

async fn build_ifd_plan<P: PlaneReader>(
    request: &WriteRequest,
    plane_reader: &P,
    c: usize,
    z: usize,
    t: usize,
    sample_format_code: u16,
    bits_per_sample: u16,
    image_description: Option<String>,
    cancel: Option<&CancellationToken>,
) -> Result<IfdPlan, BridgeError> {
    let bytes_per_element = request.dtype.bytes_per_element() as usize;
    let level0 = request.levels[0];

    let plane0 = plane_reader.read_plane(0, c, z, t, cancel).await?;
    let blocks0 = tile_plane(
        &plane0,
        level0.width,
        level0.height,
        request.tile_width,
        request.tile_height,
        bytes_per_element,
        request.compression,
        request.deflate_level,
    )?;

    let mut sub_ifds = Vec::with_capacity(request.levels.len().saturating_sub(1));
    for (level_index, level) in request.levels.iter().enumerate().skip(1) {
        let plane = plane_reader.read_plane(level_index, c, z, t, cancel).await?;
        let blocks = tile_plane(
            &plane,
            level.width,
            level.height,
            request.tile_width,
            request.tile_height,
            bytes_per_element,
            request.compression,
            request.deflate_level,
        )?;
        sub_ifds.push(IfdPlan {
            width: level.width,
            height: level.height,
            bits_per_sample,
            sample_format: sample_format_code,
            tile_width: request.tile_width,
            tile_height: request.tile_height,
            compression: request.compression,
            blocks,
            image_description: None,
            is_sub_resolution: true,
            sub_ifds: Vec::new(),
        });
    }

    Ok(IfdPlan {
        width: level0.width,
        height: level0.height,
        bits_per_sample,
        sample_format: sample_format_code,
        tile_width: request.tile_width,
        tile_height: request.tile_height,
        compression: request.compression,
        blocks: blocks0,
        image_description,
        is_sub_resolution: false,
        sub_ifds,
    })
}

/// Split a dense plane into tile- (or single-strip-) sized, zero-padded,
/// already-compressed blocks in row-major tile order (§4.E.3).
fn tile_plane(
    plane: &[u8],
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    bytes_per_element: usize,
    compression: Compression,
    deflate_level: Option<u32>,
) -> Result<Vec<Vec<u8>>, BridgeError> {
    let expected_len = width as usize * height as usize * bytes_per_element;
    if plane.len() != expected_len {
        return Err(BridgeError::UnsupportedTagCombination(format!(
            "plane reader returned {} bytes, expected {expected_len}",
            plane.len()
        )));
    }

    if tile_width == 0 {
        return Ok(vec![compress_block(plane, compression, deflate_level)?]);
    }

    let tiles_x = width.div_ceil(tile_width);
    let tiles_y = height.div_ceil(tile_height);
    let row_len = tile_width as usize * bytes_per_element;
    let mut blocks = Vec::with_capacity((tiles_x * tiles_y) as usize);

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut tile = vec![0u8; tile_width as usize * tile_height as usize * bytes_per_element];
            let src_x0 = tx * tile_width;
            let copy_w = tile_width.min(width.saturating_sub(src_x0));
            for row in 0..tile_height {
                let src_y = ty * tile_height + row;
                if src_y >= height || copy_w == 0 {
                    continue;
                }
                let src_start =
                    (src_y as usize * width as usize + src_x0 as usize) * bytes_per_element;
                let dst_start = row as usize * row_len;
                let copy_len = copy_w as usize * bytes_per_element;
                tile[dst_start..dst_start + copy_len]
                    .copy_from_slice(&plane[src_start..src_start + copy_len]);
            }
            blocks.push(compress_block(&tile, compression, deflate_level)?);
        }
    }

    Ok(blocks)
}

fn compress_block(
    data: &[u8],
    compression: Compression,
    level: Option<u32>,
) -> Result<Vec<u8>, BridgeError> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Deflate | Compression::AdobeDeflate => {
            Ok(deflate::compress(data, level.unwrap_or(deflate::DEFAULT_LEVEL)))
        }
        other => Err(BridgeError::UnsupportedTagCombination(format!(
            "unsupported write compression: {}",
            other.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct GradientPlaneReader {
        widths: Vec<u32>,
        heights: Vec<u32>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlaneReader for GradientPlaneReader {
        async fn read_plane(
            &self,
            level: usize,
            c: usize,
            _z: usize,
            _t: usize,
            _cancel: Option<&CancellationToken>,
        ) -> Result<Bytes, BridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let width = self.widths[level];
            let height = self.heights[level];
            let mut buf = vec![0u8; (width * height) as usize];
            for (i, p) in buf.iter_mut().enumerate() {
                *p = ((i + c) % 256) as u8;
            }
            Ok(Bytes::from(buf))
        }
    }

    fn base_request(levels: Vec<MultiscaleLevel>) -> WriteRequest {
        WriteRequest {
            creator: "ome-bridge".to_string(),
            name: "test".to_string(),
            size_z: 1,
            size_c: 2,
            size_t: 1,
            dimension_order: DimensionOrder::Xyzct,
            dtype: ArrayDType::Uint8,
            physical_size_x: None,
            physical_size_y: None,
            physical_size_z: None,
            physical_size_x_unit_name: None,
            physical_size_y_unit_name: None,
            physical_size_z_unit_name: None,
            channels: vec![
                GeneratorChannel {
                    id: "Channel:0:0".to_string(),
                    name: None,
                    color: None,
                },
                GeneratorChannel {
                    id: "Channel:0:1".to_string(),
                    name: None,
                    color: None,
                },
            ],
            levels,
            tile_width: 16,
            tile_height: 16,
            compression: Compression::None,
            deflate_level: None,
            format: TiffFormat::Classic,
            max_concurrency: 2,
        }
    }

    #[tokio::test]
    async fn emits_classic_tiff_with_one_ifd_per_plane() {
        let levels = vec![MultiscaleLevel { width: 32, height: 32 }];
        let request = base_request(levels);
        let reader = Arc::new(GradientPlaneReader {
            widths: vec![32],
            heights: vec![32],
            calls: AtomicUsize::new(0),
        });

        let bytes = write_ome_tiff(request, reader.clone(), None).await.unwrap();
        assert_eq!(&bytes[0..4], &[0x49, 0x49, 0x2A, 0x00]);
        // size_c=2, size_z=1, size_t=1 -> 2 planes, each at one level.
        assert_eq!(reader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn embeds_sub_resolution_levels_via_sub_ifds() {
        let levels = vec![
            MultiscaleLevel { width: 32, height: 32 },
            MultiscaleLevel { width: 16, height: 16 },
        ];
        let request = base_request(levels);
        let reader = Arc::new(GradientPlaneReader {
            widths: vec![32, 16],
            heights: vec![32, 16],
            calls: AtomicUsize::new(0),
        });

        let bytes = write_ome_tiff(request, reader.clone(), None).await.unwrap();
        assert!(!bytes.is_empty());
        // 2 planes x 2 levels each.
        assert_eq!(reader.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn tile_plane_zero_pads_edge_tiles() {
        let plane: Vec<u8> = (0..(10 * 10)).map(|i| (i % 256) as u8).collect();
        let blocks = tile_plane(&plane, 10, 10, 8, 8, 1, Compression::None, None).unwrap();
        // 2x2 tiles of 8x8 each, even though the image is only 10x10.
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].len(), 64);
    }

    #[test]
    fn tile_plane_rejects_wrong_length() {
        let plane = vec![0u8; 10];
        let err = tile_plane(&plane, 10, 10, 0, 0, 1, Compression::None, None).unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedTagCombination(_)));
    }
}
