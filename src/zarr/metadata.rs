//! Zarr v3 JSON document synthesis (§6.1, §4.G): the root group document
//! and per-level array documents, derived deterministically from an open
//! file's pyramid and OME pixel model.

use serde::Serialize;

use crate::dtype::ArrayDType;
use crate::ome::{OmePixels, PyramidInfo};

/// One axis entry in `multiscales[].axes` / an array's `dimension_names`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Time,
    Channel,
    Space,
}

impl AxisKind {
    fn as_str(self) -> &'static str {
        match self {
            AxisKind::Time => "time",
            AxisKind::Channel => "channel",
            AxisKind::Space => "space",
        }
    }
}

/// The non-spatial-axis-omitting, `t, c, z, y, x` dimension order (§4.G):
/// axes whose OME size is 1 are dropped; `y` and `x` are always kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    T,
    C,
    Z,
    Y,
    X,
}

impl Axis {
    fn name(self) -> &'static str {
        match self {
            Axis::T => "t",
            Axis::C => "c",
            Axis::Z => "z",
            Axis::Y => "y",
            Axis::X => "x",
        }
    }

    fn kind(self) -> AxisKind {
        match self {
            Axis::T => AxisKind::Time,
            Axis::C => AxisKind::Channel,
            Axis::Z | Axis::Y | Axis::X => AxisKind::Space,
        }
    }
}

/// Determine the emitted axis order for a given pixel model (§4.G).
pub fn emitted_axes(pixels: &OmePixels) -> Vec<Axis> {
    let mut axes = Vec::with_capacity(5);
    if pixels.size_t > 1 {
        axes.push(Axis::T);
    }
    if pixels.size_c > 1 {
        axes.push(Axis::C);
    }
    if pixels.size_z > 1 {
        axes.push(Axis::Z);
    }
    axes.push(Axis::Y);
    axes.push(Axis::X);
    axes
}

#[derive(Debug, Serialize)]
pub struct ZarrAxis {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScaleTransform {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub scale: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct Dataset {
    pub path: String,
    #[serde(rename = "coordinateTransformations")]
    pub coordinate_transformations: Vec<ScaleTransform>,
}

#[derive(Debug, Serialize)]
pub struct OmeMultiscale {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub axes: Vec<ZarrAxis>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Serialize)]
pub struct OmeAttributes {
    pub version: &'static str,
    pub multiscales: Vec<OmeMultiscale>,
}

#[derive(Debug, Serialize)]
pub struct RootAttributes {
    pub ome: OmeAttributes,
}

#[derive(Debug, Serialize)]
pub struct RootGroupDocument {
    pub zarr_format: u8,
    pub node_type: &'static str,
    pub attributes: RootAttributes,
}

/// Synthesise the root group document (§6.1).
pub fn root_group_document(
    name: Option<&str>,
    pixels: &OmePixels,
    pyramid: &PyramidInfo,
) -> RootGroupDocument {
    let axes = emitted_axes(pixels);
    let zarr_axes = axes
        .iter()
        .map(|axis| ZarrAxis {
            name: axis.name().to_string(),
            kind: axis.kind().as_str().to_string(),
            unit: match axis {
                Axis::Z => Some(pixels.physical_size_z_unit.clone()),
                Axis::Y => Some(pixels.physical_size_y_unit.clone()),
                Axis::X => Some(pixels.physical_size_x_unit.clone()),
                _ => None,
            },
        })
        .collect();

    let datasets = (0..pyramid.levels)
        .map(|level| Dataset {
            path: level.to_string(),
            coordinate_transformations: vec![scale_transform(&axes, pixels, pyramid, level)],
        })
        .collect();

    RootGroupDocument {
        zarr_format: 3,
        node_type: "group",
        attributes: RootAttributes {
            ome: OmeAttributes {
                version: "0.5",
                multiscales: vec![OmeMultiscale {
                    name: name.map(str::to_string),
                    axes: zarr_axes,
                    datasets,
                }],
            },
        },
    }
}

fn scale_transform(
    axes: &[Axis],
    pixels: &OmePixels,
    pyramid: &PyramidInfo,
    level: usize,
) -> ScaleTransform {
    let width0 = pyramid.widths[0].max(1) as f64;
    let height0 = pyramid.heights[0].max(1) as f64;
    let width_l = pyramid.widths[level].max(1) as f64;
    let height_l = pyramid.heights[level].max(1) as f64;
    let downsample_x = width0 / width_l;
    let downsample_y = height0 / height_l;

    let scale = axes
        .iter()
        .map(|axis| match axis {
            Axis::X => pixels.physical_size_x.unwrap_or(1.0) * downsample_x,
            Axis::Y => pixels.physical_size_y.unwrap_or(1.0) * downsample_y,
            Axis::Z => pixels.physical_size_z.unwrap_or(1.0),
            Axis::T | Axis::C => 1.0,
        })
        .collect();

    ScaleTransform {
        kind: "scale",
        scale,
    }
}

#[derive(Debug, Serialize)]
pub struct ChunkGridConfiguration {
    pub chunk_shape: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct ChunkGrid {
    pub name: &'static str,
    pub configuration: ChunkGridConfiguration,
}

#[derive(Debug, Serialize)]
pub struct ChunkKeyEncodingConfiguration {
    pub separator: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChunkKeyEncoding {
    pub name: &'static str,
    pub configuration: ChunkKeyEncodingConfiguration,
}

#[derive(Debug, Serialize)]
pub struct CodecConfiguration {
    pub endian: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Codec {
    pub name: &'static str,
    pub configuration: CodecConfiguration,
}

#[derive(Debug, Serialize)]
pub struct ArrayDocument {
    pub zarr_format: u8,
    pub node_type: &'static str,
    pub shape: Vec<u64>,
    pub data_type: &'static str,
    pub chunk_grid: ChunkGrid,
    pub chunk_key_encoding: ChunkKeyEncoding,
    pub fill_value: u8,
    pub codecs: Vec<Codec>,
    pub dimension_names: Vec<String>,
}

/// Shape and chunk-shape geometry for level `level`, used both by
/// [`array_document`] and the facade's chunk-read path.
pub struct LevelGeometry {
    pub axes: Vec<Axis>,
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
}

/// Compute level geometry (§4.G "Shape at level L" / "Chunk shape at
/// level L").
pub fn level_geometry(
    pixels: &OmePixels,
    pyramid: &PyramidInfo,
    level: usize,
    tile_width: u32,
    tile_height: u32,
) -> LevelGeometry {
    let axes = emitted_axes(pixels);
    let width = pyramid.widths[level];
    let height = pyramid.heights[level];
    let tile_w = if tile_width == 0 { width } else { tile_width };
    let tile_h = if tile_height == 0 { height } else { tile_height };

    let shape = axes
        .iter()
        .map(|axis| match axis {
            Axis::T => pixels.size_t as u64,
            Axis::C => pixels.size_c as u64,
            Axis::Z => pixels.size_z as u64,
            Axis::Y => height as u64,
            Axis::X => width as u64,
        })
        .collect();

    let chunk_shape = axes
        .iter()
        .map(|axis| match axis {
            Axis::T | Axis::C | Axis::Z => 1,
            Axis::Y => tile_h.min(height) as u64,
            Axis::X => tile_w.min(width) as u64,
        })
        .collect();

    LevelGeometry {
        axes,
        shape,
        chunk_shape,
    }
}

/// Synthesise a per-level array document (§6.1).
pub fn array_document(
    pixels: &OmePixels,
    pyramid: &PyramidInfo,
    level: usize,
    dtype: ArrayDType,
    tile_width: u32,
    tile_height: u32,
) -> ArrayDocument {
    let geometry = level_geometry(pixels, pyramid, level, tile_width, tile_height);
    let dimension_names = geometry.axes.iter().map(|axis| axis.name().to_string()).collect();

    ArrayDocument {
        zarr_format: 3,
        node_type: "array",
        shape: geometry.shape,
        data_type: dtype.zarr_data_type(),
        chunk_grid: ChunkGrid {
            name: "regular",
            configuration: ChunkGridConfiguration {
                chunk_shape: geometry.chunk_shape,
            },
        },
        chunk_key_encoding: ChunkKeyEncoding {
            name: "default",
            configuration: ChunkKeyEncodingConfiguration { separator: "/" },
        },
        fill_value: 0,
        codecs: vec![Codec {
            name: "bytes",
            configuration: CodecConfiguration { endian: "little" },
        }],
        dimension_names,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ome::{DimensionOrder, OmeChannel};

    fn pixels() -> OmePixels {
        OmePixels {
            size_x: 512,
            size_y: 256,
            size_z: 1,
            size_c: 3,
            size_t: 1,
            dimension_order: DimensionOrder::Xyzct,
            element_type: "uint16".to_string(),
            physical_size_x: Some(0.5),
            physical_size_y: Some(0.5),
            physical_size_z: None,
            physical_size_x_unit: "µm".to_string(),
            physical_size_y_unit: "µm".to_string(),
            physical_size_z_unit: "µm".to_string(),
            big_endian: false,
            interleaved: false,
            channels: vec![
                OmeChannel::default_for_index(0),
                OmeChannel::default_for_index(1),
                OmeChannel::default_for_index(2),
            ],
            tiff_data: Vec::new(),
        }
    }

    #[test]
    fn size_one_axes_are_omitted_but_yx_always_present() {
        let axes = emitted_axes(&pixels());
        assert_eq!(axes, vec![Axis::C, Axis::Y, Axis::X]);
    }

    #[test]
    fn shape_and_chunk_shape_lengths_match_dimension_names() {
        let pyramid = PyramidInfo {
            levels: 2,
            uses_sub_ifds: true,
            widths: vec![512, 256],
            heights: vec![256, 128],
        };
        let doc = array_document(&pixels(), &pyramid, 1, ArrayDType::Uint16, 128, 128);
        assert_eq!(doc.shape.len(), doc.dimension_names.len());
        assert_eq!(doc.chunk_grid.configuration.chunk_shape.len(), doc.shape.len());
        assert!(doc.shape.iter().all(|&s| s > 0));
        assert_eq!(doc.shape, vec![3, 128, 256]);
        assert_eq!(doc.chunk_grid.configuration.chunk_shape, vec![1, 128, 128]);
    }

    #[test]
    fn scale_transform_uses_downsample_factor() {
        let pyramid = PyramidInfo {
            levels: 2,
            uses_sub_ifds: true,
            widths: vec![512, 256],
            heights: vec![256, 128],
        };
        let doc = root_group_document(None, &pixels(), &pyramid);
        let level1 = &doc.attributes.ome.multiscales[0].datasets[1];
        let scale = &level1.coordinate_transformations[0].scale;
        // axes are [c, y, x]; y and x both downsample by 2x from level 0.
        assert_eq!(scale[0], 1.0);
        assert_eq!(scale[1], 1.0);
        assert_eq!(scale[2], 1.0);
    }
}
