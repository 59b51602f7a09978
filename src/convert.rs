//! Filesystem-facing glue between the library and `ome-bridge-cli`: read
//! an OME-TIFF and lay its Zarr store out as files under a directory
//! (`to_zarr`), or read a Zarr store laid out that way back and encode
//! it as one OME-TIFF (`to_tiff`). No format logic lives here — both
//! directions drive the same [`crate::zarr::ZarrFacade`] and
//! [`crate::writer`] entry points the library exposes for any other
//! caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

use crate::dtype::ArrayDType;
use crate::error::{BridgeError, IoError};
use crate::io::FileByteSource;
use crate::ome::{parse_ome_xml, DimensionOrder, GeneratorChannel};
use crate::tiff::TiffReader;
use crate::writer::{write_ome_tiff, MultiscaleLevel, PlaneReader, WriteRequest};
use crate::zarr::ZarrFacade;

fn io_err(e: std::io::Error, context: impl AsRef<str>) -> BridgeError {
    BridgeError::Io(IoError::Transport(format!("{}: {e}", context.as_ref())))
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), BridgeError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(e, format!("creating {}", parent.display())))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| io_err(e, format!("writing {}", path.display())))
}

/// Increment a mixed-radix counter in place (the last axis is fastest);
/// returns `false` once every combination has been visited.
fn next_index(indices: &mut [u64], dims: &[u64]) -> bool {
    for axis in (0..indices.len()).rev() {
        indices[axis] += 1;
        if indices[axis] < dims[axis] {
            return true;
        }
        indices[axis] = 0;
    }
    false
}

/// Read an OME-TIFF file and write its Zarr v3 key space out as a real
/// directory tree: `zarr.json`, `{level}/zarr.json`, and every chunk the
/// root/level metadata declares. Returns the number of files written.
pub async fn to_zarr(input: &Path, output_dir: &Path) -> Result<usize, BridgeError> {
    let source = FileByteSource::open(input)
        .await
        .map_err(BridgeError::Io)?;
    let reader = TiffReader::open(source).await?;
    let base_ifd = reader.read_ifd_at(reader.first_ifd_offset(), None).await?;
    let xml = base_ifd.directory.image_description().ok_or_else(|| {
        BridgeError::InvalidXml("base IFD has no ImageDescription tag".to_string())
    })?;
    let doc = parse_ome_xml(xml)?;
    let facade = ZarrFacade::open(reader, doc, None).await?;

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| io_err(e, format!("creating {}", output_dir.display())))?;

    let mut written = 0usize;

    let root_bytes = facade
        .get("zarr.json", None)
        .await?
        .expect("root metadata is always present");
    write_file(&output_dir.join("zarr.json"), &root_bytes).await?;
    written += 1;

    for level in 0..facade.levels() {
        let level_key = format!("{level}/zarr.json");
        let level_bytes = facade
            .get(&level_key, None)
            .await?
            .expect("level metadata is present for every level in range");
        write_file(
            &output_dir.join(level.to_string()).join("zarr.json"),
            &level_bytes,
        )
        .await?;
        written += 1;

        let doc: Json = serde_json::from_slice(&level_bytes)
            .map_err(|e| BridgeError::InvalidXml(format!("malformed level metadata: {e}")))?;
        let shape = json_u64_array(&doc["shape"]);
        let chunk_shape = json_u64_array(&doc["chunk_grid"]["configuration"]["chunk_shape"]);
        let dims: Vec<u64> = shape
            .iter()
            .zip(chunk_shape.iter())
            .map(|(&s, &c)| s.div_ceil(c.max(1)))
            .collect();

        if dims.iter().any(|&d| d == 0) {
            continue;
        }

        let mut indices = vec![0u64; dims.len()];
        loop {
            let key = format!(
                "{level}/c/{}",
                indices
                    .iter()
                    .map(u64::to_string)
                    .collect::<Vec<_>>()
                    .join("/")
            );
            if let Some(chunk_bytes) = facade.get(&key, None).await? {
                let mut path = output_dir.join(level.to_string()).join("c");
                for idx in &indices {
                    path = path.join(idx.to_string());
                }
                write_file(&path, &chunk_bytes).await?;
                written += 1;
            }
            if !next_index(&mut indices, &dims) {
                break;
            }
        }
    }

    Ok(written)
}

fn json_u64_array(value: &Json) -> Vec<u64> {
    value
        .as_array()
        .map(|entries| entries.iter().filter_map(Json::as_u64).collect())
        .unwrap_or_default()
}

/// Parsed, cached `{level}/zarr.json` geometry: everything
/// [`DiskZarrPlaneReader`] needs to stitch chunks back into planes.
struct LevelLayout {
    shape: Vec<u64>,
    chunk_shape: Vec<u64>,
    dimension_names: Vec<String>,
    data_type: String,
}

fn parse_level_layout(bytes: &[u8]) -> Result<LevelLayout, BridgeError> {
    let doc: Json = serde_json::from_slice(bytes)
        .map_err(|e| BridgeError::InvalidXml(format!("malformed level metadata: {e}")))?;
    let dimension_names = doc["dimension_names"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(Json::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let data_type = doc["data_type"]
        .as_str()
        .ok_or_else(|| BridgeError::InvalidXml("level metadata missing data_type".to_string()))?
        .to_string();
    Ok(LevelLayout {
        shape: json_u64_array(&doc["shape"]),
        chunk_shape: json_u64_array(&doc["chunk_grid"]["configuration"]["chunk_shape"]),
        dimension_names,
        data_type,
    })
}

fn array_dtype_from_zarr_type(data_type: &str) -> Result<ArrayDType, BridgeError> {
    match data_type {
        "int8" => Ok(ArrayDType::Int8),
        "int16" => Ok(ArrayDType::Int16),
        "int32" => Ok(ArrayDType::Int32),
        "uint8" => Ok(ArrayDType::Uint8),
        "uint16" => Ok(ArrayDType::Uint16),
        "uint32" => Ok(ArrayDType::Uint32),
        "float32" => Ok(ArrayDType::Float32),
        "float64" => Ok(ArrayDType::Float64),
        other => Err(BridgeError::UnsupportedDtype(other.to_string())),
    }
}

/// A [`PlaneReader`] that stitches planes back together from chunk files
/// laid out under a store directory exactly as [`to_zarr`] produces.
struct DiskZarrPlaneReader {
    root: PathBuf,
}

impl DiskZarrPlaneReader {
    async fn level_layout(&self, level: usize) -> Result<LevelLayout, BridgeError> {
        let path = self.root.join(level.to_string()).join("zarr.json");
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| io_err(e, format!("reading {}", path.display())))?;
        parse_level_layout(&bytes)
    }
}

#[async_trait]
impl PlaneReader for DiskZarrPlaneReader {
    async fn read_plane(
        &self,
        level: usize,
        c: usize,
        z: usize,
        t: usize,
        _cancel: Option<&CancellationToken>,
    ) -> Result<Bytes, BridgeError> {
        let layout = self.level_layout(level).await?;
        let dtype = array_dtype_from_zarr_type(&layout.data_type)?;
        let bytes_per_element = dtype.bytes_per_element() as usize;

        let n = layout.dimension_names.len();
        if n < 2 || layout.shape.len() != n || layout.chunk_shape.len() != n {
            return Err(BridgeError::UnsupportedTagCombination(
                "level metadata has inconsistent axis counts".to_string(),
            ));
        }

        let height = layout.shape[n - 2] as usize;
        let width = layout.shape[n - 1] as usize;
        let chunk_h = layout.chunk_shape[n - 2] as usize;
        let chunk_w = layout.chunk_shape[n - 1] as usize;

        let mut indices = vec![0usize; n];
        for (axis, name) in layout.dimension_names.iter().enumerate() {
            indices[axis] = match name.as_str() {
                "t" => t,
                "c" => c,
                "z" => z,
                _ => 0,
            };
        }

        let tiles_y = height.div_ceil(chunk_h.max(1));
        let tiles_x = width.div_ceil(chunk_w.max(1));
        let mut out = vec![0u8; width * height * bytes_per_element];

        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                indices[n - 2] = ty;
                indices[n - 1] = tx;
                let key = indices
                    .iter()
                    .map(usize::to_string)
                    .collect::<Vec<_>>()
                    .join("/");
                let path = self.root.join(level.to_string()).join("c").join(&key);
                let chunk = tokio::fs::read(&path)
                    .await
                    .map_err(|e| io_err(e, format!("reading {}", path.display())))?;

                let copy_w = chunk_w.min(width - tx * chunk_w);
                let copy_h = chunk_h.min(height - ty * chunk_h);
                for row in 0..copy_h {
                    let src_start = row * chunk_w * bytes_per_element;
                    let dst_row = ty * chunk_h + row;
                    let dst_start = (dst_row * width + tx * chunk_w) * bytes_per_element;
                    let len = copy_w * bytes_per_element;
                    out[dst_start..dst_start + len]
                        .copy_from_slice(&chunk[src_start..src_start + len]);
                }
            }
        }

        Ok(Bytes::from(out))
    }
}

/// Read a Zarr v3 store directory laid out as [`to_zarr`] produces and
/// encode it as a single OME-TIFF file.
pub async fn to_tiff(
    input_dir: &Path,
    output: &Path,
    tile_size: u32,
    compression: crate::tiff::Compression,
    deflate_level: Option<u32>,
    format: crate::tiff::TiffFormat,
    max_concurrency: usize,
) -> Result<(), BridgeError> {
    let root_path = input_dir.join("zarr.json");
    let root_bytes = tokio::fs::read(&root_path)
        .await
        .map_err(|e| io_err(e, format!("reading {}", root_path.display())))?;
    let root_doc: Json = serde_json::from_slice(&root_bytes)
        .map_err(|e| BridgeError::InvalidXml(format!("malformed root metadata: {e}")))?;

    let datasets = root_doc["attributes"]["ome"]["multiscales"][0]["datasets"]
        .as_array()
        .ok_or_else(|| BridgeError::InvalidXml("root metadata missing datasets".to_string()))?;
    if datasets.is_empty() {
        return Err(BridgeError::UnsupportedTagCombination(
            "store has no multiscale levels".to_string(),
        ));
    }

    let mut levels = Vec::with_capacity(datasets.len());
    let mut layouts = Vec::with_capacity(datasets.len());
    for level in 0..datasets.len() {
        let path = input_dir.join(level.to_string()).join("zarr.json");
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| io_err(e, format!("reading {}", path.display())))?;
        let layout = parse_level_layout(&bytes)?;
        let n = layout.shape.len();
        levels.push(MultiscaleLevel {
            width: layout.shape[n - 1] as u32,
            height: layout.shape[n - 2] as u32,
        });
        layouts.push(layout);
    }

    let base = &layouts[0];
    let dtype = array_dtype_from_zarr_type(&base.data_type)?;
    let size_c = axis_size(base, "c");
    let size_z = axis_size(base, "z");
    let size_t = axis_size(base, "t");
    let name = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string();

    let channels = (0..size_c.max(1))
        .map(|i| GeneratorChannel {
            id: format!("Channel:0:{i}"),
            name: None,
            color: None,
        })
        .collect();

    let request = WriteRequest {
        creator: "ome-bridge".to_string(),
        name,
        size_z: size_z.max(1),
        size_c: size_c.max(1),
        size_t: size_t.max(1),
        dimension_order: DimensionOrder::Xyczt,
        dtype,
        physical_size_x: None,
        physical_size_y: None,
        physical_size_z: None,
        physical_size_x_unit_name: None,
        physical_size_y_unit_name: None,
        physical_size_z_unit_name: None,
        channels,
        levels,
        tile_width: tile_size,
        tile_height: tile_size,
        compression,
        deflate_level,
        format,
        max_concurrency,
    };

    let plane_reader = Arc::new(DiskZarrPlaneReader {
        root: input_dir.to_path_buf(),
    });
    let bytes = write_ome_tiff(request, plane_reader, None).await?;
    write_file(output, &bytes).await
}

fn axis_size(layout: &LevelLayout, axis: &str) -> u32 {
    layout
        .dimension_names
        .iter()
        .position(|name| name == axis)
        .map(|idx| layout.shape[idx] as u32)
        .unwrap_or(1)
}
