//! The OME-XML data model: `DimensionOrder` index math, `OmePixels` and
//! its nested types, shared by the parser (§4.C), the generator (§4.D),
//! and the indexer (§4.F).

use crate::error::BridgeError;

/// One of the three axes a `DimensionOrder` permutes: `Z`, `C`, `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Z,
    C,
    T,
}

/// The permutation of `{Z, C, T}` (always prefixed by `XY`) governing how
/// `(c, z, t)` triples linearise into IFD indices. Named after the
/// fastest-to-slowest order the letters list, matching the OME-XML
/// attribute spelling exactly (`"XYZCT"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionOrder {
    Xyzct,
    Xyztc,
    Xyczt,
    Xyctz,
    Xytcz,
    Xytzc,
}

impl DimensionOrder {
    pub const ALL: [DimensionOrder; 6] = [
        DimensionOrder::Xyzct,
        DimensionOrder::Xyztc,
        DimensionOrder::Xyczt,
        DimensionOrder::Xyctz,
        DimensionOrder::Xytcz,
        DimensionOrder::Xytzc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DimensionOrder::Xyzct => "XYZCT",
            DimensionOrder::Xyztc => "XYZTC",
            DimensionOrder::Xyczt => "XYCZT",
            DimensionOrder::Xyctz => "XYCTZ",
            DimensionOrder::Xytcz => "XYTCZ",
            DimensionOrder::Xytzc => "XYTZC",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, BridgeError> {
        match s {
            "XYZCT" => Ok(DimensionOrder::Xyzct),
            "XYZTC" => Ok(DimensionOrder::Xyztc),
            "XYCZT" => Ok(DimensionOrder::Xyczt),
            "XYCTZ" => Ok(DimensionOrder::Xyctz),
            "XYTCZ" => Ok(DimensionOrder::Xytcz),
            "XYTZC" => Ok(DimensionOrder::Xytzc),
            other => Err(BridgeError::InvalidDimensionOrder(other.to_string())),
        }
    }

    /// The three permuted axes, fastest-varying first.
    fn tail(self) -> [Dimension; 3] {
        match self {
            DimensionOrder::Xyzct => [Dimension::Z, Dimension::C, Dimension::T],
            DimensionOrder::Xyztc => [Dimension::Z, Dimension::T, Dimension::C],
            DimensionOrder::Xyczt => [Dimension::C, Dimension::Z, Dimension::T],
            DimensionOrder::Xyctz => [Dimension::C, Dimension::T, Dimension::Z],
            DimensionOrder::Xytcz => [Dimension::T, Dimension::C, Dimension::Z],
            DimensionOrder::Xytzc => [Dimension::T, Dimension::Z, Dimension::C],
        }
    }

    fn index_and_size(dim: Dimension, c: usize, z: usize, t: usize, size_c: usize, size_z: usize, size_t: usize) -> (usize, usize) {
        match dim {
            Dimension::Z => (z, size_z),
            Dimension::C => (c, size_c),
            Dimension::T => (t, size_t),
        }
    }

    /// `(c, z, t) -> IFD index within the plane block` (§4.F.2).
    pub fn plane_to_ifd(self, c: usize, z: usize, t: usize, size_c: usize, size_z: usize, size_t: usize) -> usize {
        let [d0, d1, d2] = self.tail();
        let (i0, s0) = Self::index_and_size(d0, c, z, t, size_c, size_z, size_t);
        let (i1, s1) = Self::index_and_size(d1, c, z, t, size_c, size_z, size_t);
        let (i2, _s2) = Self::index_and_size(d2, c, z, t, size_c, size_z, size_t);
        i0 + s0 * i1 + s0 * s1 * i2
    }

    /// The exact inverse of [`Self::plane_to_ifd`] (§4.H step 3).
    pub fn ifd_to_plane(self, index: usize, size_c: usize, size_z: usize, size_t: usize) -> (usize, usize, usize) {
        let [d0, d1, d2] = self.tail();
        let s0 = match d0 {
            Dimension::Z => size_z,
            Dimension::C => size_c,
            Dimension::T => size_t,
        };
        let s1 = match d1 {
            Dimension::Z => size_z,
            Dimension::C => size_c,
            Dimension::T => size_t,
        };

        let i0 = index % s0.max(1);
        let rem = index / s0.max(1);
        let i1 = rem % s1.max(1);
        let i2 = rem / s1.max(1);

        let mut c = 0;
        let mut z = 0;
        let mut t = 0;
        for (dim, value) in [(d0, i0), (d1, i1), (d2, i2)] {
            match dim {
                Dimension::Z => z = value,
                Dimension::C => c = value,
                Dimension::T => t = value,
            }
        }
        (c, z, t)
    }
}

/// A physical unit attached to a spatial axis's pixel size. Stored as the
/// OME unit symbol (`"µm"`, `"nm"`, ...) since the bridge never performs
/// unit conversion — only round-trips the string.
pub type PhysicalUnit = String;

/// One channel of an `OmePixels` (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct OmeChannel {
    pub id: String,
    pub name: Option<String>,
    pub samples_per_pixel: u32,
    pub color: Option<i32>,
}

impl OmeChannel {
    pub fn default_for_index(index: usize) -> Self {
        OmeChannel {
            id: format!("Channel:0:{index}"),
            name: None,
            samples_per_pixel: 1,
            color: None,
        }
    }
}

/// One `TiffData` element: a block of planes mapped to a run of IFDs,
/// optionally in another file (§3, §4.F.2).
#[derive(Debug, Clone, PartialEq)]
pub struct TiffDataEntry {
    pub first_c: usize,
    pub first_z: usize,
    pub first_t: usize,
    pub ifd: usize,
    pub plane_count: usize,
    pub uuid: Option<String>,
    pub file_name: Option<String>,
}

/// The dimension and channel description of one OME `Image` (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct OmePixels {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    pub dimension_order: DimensionOrder,
    pub element_type: String,
    pub physical_size_x: Option<f64>,
    pub physical_size_y: Option<f64>,
    pub physical_size_z: Option<f64>,
    pub physical_size_x_unit: PhysicalUnit,
    pub physical_size_y_unit: PhysicalUnit,
    pub physical_size_z_unit: PhysicalUnit,
    pub big_endian: bool,
    pub interleaved: bool,
    pub channels: Vec<OmeChannel>,
    pub tiff_data: Vec<TiffDataEntry>,
}

impl OmePixels {
    pub fn planes_per_image(&self) -> usize {
        self.size_c as usize * self.size_z as usize * self.size_t as usize
    }
}

/// One `Image` element: an identifier, optional name, and its `Pixels`.
#[derive(Debug, Clone, PartialEq)]
pub struct OmeImage {
    pub id: String,
    pub name: Option<String>,
    pub pixels: OmePixels,
}

/// The result of parsing an OME-XML document: every `Image` found plus
/// the root `UUID`, used for multi-file routing (§4.F.2).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OmeDocument {
    pub images: Vec<OmeImage>,
    pub root_uuid: Option<String>,
}

/// A pyramid's per-level geometry (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidInfo {
    pub levels: usize,
    pub uses_sub_ifds: bool,
    pub widths: Vec<u32>,
    pub heights: Vec<u32>,
}

/// A single plane selection, `0 <= c < sizeC`, etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneSelection {
    pub c: usize,
    pub z: usize,
    pub t: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_order_round_trips_strings() {
        for order in DimensionOrder::ALL {
            assert_eq!(DimensionOrder::from_str(order.as_str()).unwrap(), order);
        }
        assert!(DimensionOrder::from_str("XYQCT").is_err());
    }

    #[test]
    fn plane_to_ifd_matches_s4() {
        let order = DimensionOrder::Xytzc;
        assert_eq!(order.plane_to_ifd(1, 0, 0, 3, 2, 2), 4);
        assert_eq!(order.plane_to_ifd(0, 1, 0, 3, 2, 2), 2);
        assert_eq!(order.plane_to_ifd(0, 0, 1, 3, 2, 2), 1);
        assert_eq!(order.plane_to_ifd(0, 0, 0, 3, 2, 2), 0);
    }

    #[test]
    fn ifd_to_plane_is_exact_inverse_for_all_orders() {
        let (size_c, size_z, size_t) = (3usize, 2usize, 4usize);
        for order in DimensionOrder::ALL {
            for c in 0..size_c {
                for z in 0..size_z {
                    for t in 0..size_t {
                        let index = order.plane_to_ifd(c, z, t, size_c, size_z, size_t);
                        assert_eq!(order.ifd_to_plane(index, size_c, size_z, size_t), (c, z, t));
                    }
                }
            }
        }
    }

    #[test]
    fn default_channel_naming() {
        assert_eq!(OmeChannel::default_for_index(2).id, "Channel:0:2");
    }
}
