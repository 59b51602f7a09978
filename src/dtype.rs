//! Dtype registry: the bijection between TIFF sample format + bit depth,
//! OME `Type` strings, and array element types.
//!
//! These three spellings of the same element type appear in three
//! independent places in an OME-TIFF file (TIFF tags, the embedded
//! OME-XML, and — on the Zarr side — `data_type` in array metadata) and
//! must round-trip exactly. Keeping the table single-sourced here, and
//! dispatching by exhaustive match rather than string comparison,
//! guarantees that.

use crate::error::BridgeError;

/// TIFF `SampleFormat` tag values (see `crate::tiff::tags::SampleFormat`
/// for the wire encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterSampleFormat {
    UnsignedInteger,
    SignedInteger,
    IeeeFloat,
}

/// The canonical element type used on the array (Zarr) side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayDType {
    Int8,
    Int16,
    Int32,
    Uint8,
    Uint16,
    Uint32,
    Float32,
    Float64,
}

impl ArrayDType {
    /// Number of bytes occupied by one element.
    pub const fn bytes_per_element(self) -> u8 {
        match self {
            ArrayDType::Int8 | ArrayDType::Uint8 => 1,
            ArrayDType::Int16 | ArrayDType::Uint16 => 2,
            ArrayDType::Int32 | ArrayDType::Uint32 | ArrayDType::Float32 => 4,
            ArrayDType::Float64 => 8,
        }
    }

    /// Zarr v3 `data_type` spelling.
    pub const fn zarr_data_type(self) -> &'static str {
        match self {
            ArrayDType::Int8 => "int8",
            ArrayDType::Int16 => "int16",
            ArrayDType::Int32 => "int32",
            ArrayDType::Uint8 => "uint8",
            ArrayDType::Uint16 => "uint16",
            ArrayDType::Uint32 => "uint32",
            ArrayDType::Float32 => "float32",
            ArrayDType::Float64 => "float64",
        }
    }
}

/// `(SampleFormat, BitsPerSample) -> ArrayDType`.
///
/// Fails for combinations with no array counterpart (16-bit float, 64-bit
/// integers, and any bit depth outside `{8, 16, 32, 64}`).
pub fn tiff_to_array_dtype(
    format: RasterSampleFormat,
    bits_per_sample: u16,
) -> Result<ArrayDType, BridgeError> {
    use RasterSampleFormat::*;
    let dtype = match (format, bits_per_sample) {
        (UnsignedInteger, 8) => ArrayDType::Uint8,
        (UnsignedInteger, 16) => ArrayDType::Uint16,
        (UnsignedInteger, 32) => ArrayDType::Uint32,
        (SignedInteger, 8) => ArrayDType::Int8,
        (SignedInteger, 16) => ArrayDType::Int16,
        (SignedInteger, 32) => ArrayDType::Int32,
        (IeeeFloat, 32) => ArrayDType::Float32,
        (IeeeFloat, 64) => ArrayDType::Float64,
        _ => {
            return Err(BridgeError::UnsupportedDtype(format!(
                "{format:?} at {bits_per_sample} bits"
            )))
        }
    };
    Ok(dtype)
}

/// Inverse of [`tiff_to_array_dtype`]: `ArrayDType -> (SampleFormat, bits)`.
pub fn array_dtype_to_tiff(dtype: ArrayDType) -> (RasterSampleFormat, u16) {
    use RasterSampleFormat::*;
    match dtype {
        ArrayDType::Uint8 => (UnsignedInteger, 8),
        ArrayDType::Uint16 => (UnsignedInteger, 16),
        ArrayDType::Uint32 => (UnsignedInteger, 32),
        ArrayDType::Int8 => (SignedInteger, 8),
        ArrayDType::Int16 => (SignedInteger, 16),
        ArrayDType::Int32 => (SignedInteger, 32),
        ArrayDType::Float32 => (IeeeFloat, 32),
        ArrayDType::Float64 => (IeeeFloat, 64),
    }
}

/// OME `Pixels/@Type` string -> `ArrayDType`, case-insensitive.
///
/// `"float"` maps to `float32` and `"double"` maps to `float64`; every
/// other spelling is matched literally against the array dtype name.
pub fn ome_type_to_array_dtype(ome_type: &str) -> Result<ArrayDType, BridgeError> {
    let lower = ome_type.to_ascii_lowercase();
    let dtype = match lower.as_str() {
        "int8" => ArrayDType::Int8,
        "int16" => ArrayDType::Int16,
        "int32" => ArrayDType::Int32,
        "uint8" => ArrayDType::Uint8,
        "uint16" => ArrayDType::Uint16,
        "uint32" => ArrayDType::Uint32,
        "float" | "float32" => ArrayDType::Float32,
        "double" | "float64" => ArrayDType::Float64,
        _ => return Err(BridgeError::UnsupportedDtype(ome_type.to_string())),
    };
    Ok(dtype)
}

/// Inverse of [`ome_type_to_array_dtype`]: `ArrayDType -> OME type string`.
pub fn array_dtype_to_ome_type(dtype: ArrayDType) -> &'static str {
    match dtype {
        ArrayDType::Int8 => "int8",
        ArrayDType::Int16 => "int16",
        ArrayDType::Int32 => "int32",
        ArrayDType::Uint8 => "uint8",
        ArrayDType::Uint16 => "uint16",
        ArrayDType::Uint32 => "uint32",
        ArrayDType::Float32 => "float",
        ArrayDType::Float64 => "double",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiff_roundtrip_for_every_supported_combination() {
        for dtype in [
            ArrayDType::Int8,
            ArrayDType::Int16,
            ArrayDType::Int32,
            ArrayDType::Uint8,
            ArrayDType::Uint16,
            ArrayDType::Uint32,
            ArrayDType::Float32,
            ArrayDType::Float64,
        ] {
            let (format, bits) = array_dtype_to_tiff(dtype);
            assert_eq!(tiff_to_array_dtype(format, bits).unwrap(), dtype);
        }
    }

    #[test]
    fn ome_type_roundtrip() {
        for dtype in [ArrayDType::Uint16, ArrayDType::Float32, ArrayDType::Float64] {
            let s = array_dtype_to_ome_type(dtype);
            assert_eq!(ome_type_to_array_dtype(s).unwrap(), dtype);
        }
    }

    #[test]
    fn ome_type_is_case_insensitive_and_has_aliases() {
        assert_eq!(
            ome_type_to_array_dtype("FLOAT").unwrap(),
            ArrayDType::Float32
        );
        assert_eq!(
            ome_type_to_array_dtype("Double").unwrap(),
            ArrayDType::Float64
        );
        assert_eq!(
            ome_type_to_array_dtype("UInt16").unwrap(),
            ArrayDType::Uint16
        );
    }

    #[test]
    fn unsupported_combinations_fail() {
        assert!(tiff_to_array_dtype(RasterSampleFormat::IeeeFloat, 16).is_err());
        assert!(tiff_to_array_dtype(RasterSampleFormat::SignedInteger, 64).is_err());
        assert!(ome_type_to_array_dtype("bit").is_err());
    }

    #[test]
    fn bytes_per_element_matches_bit_depth() {
        assert_eq!(ArrayDType::Uint8.bytes_per_element(), 1);
        assert_eq!(ArrayDType::Uint16.bytes_per_element(), 2);
        assert_eq!(ArrayDType::Uint32.bytes_per_element(), 4);
        assert_eq!(ArrayDType::Float64.bytes_per_element(), 8);
    }
}
