//! The in-memory IFD model shared by the reader and the writer.
//!
//! A single [`Value`] enum represents everything a TIFF entry can carry;
//! [`Directory`] is a tag-sorted collection of them, matching the spec's
//! "entries within an IFD are sorted ascending by tag id" emit rule by
//! construction (it is a `BTreeMap`, so iteration order is always sorted,
//! never an incidental side effect of insertion order).

use std::collections::BTreeMap;

use super::tags::{Compression, FieldType, TiffTag};

/// A decoded (or to-be-encoded) TIFF tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(Vec<u8>),
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Long8(Vec<u64>),
    Undefined(Vec<u8>),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Byte(_) => FieldType::Byte,
            Value::Ascii(_) => FieldType::Ascii,
            Value::Short(_) => FieldType::Short,
            Value::Long(_) => FieldType::Long,
            Value::Long8(_) => FieldType::Long8,
            Value::Undefined(_) => FieldType::Undefined,
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            Value::Byte(v) => v.len() as u64,
            Value::Ascii(s) => s.len() as u64 + 1, // NUL terminator
            Value::Short(v) => v.len() as u64,
            Value::Long(v) => v.len() as u64,
            Value::Long8(v) => v.len() as u64,
            Value::Undefined(v) => v.len() as u64,
        }
    }

    /// Little-endian encoded payload, as it is written into the overflow
    /// region (or the inline value field, left-aligned and zero-padded by
    /// the caller).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Value::Byte(v) => v.clone(),
            Value::Ascii(s) => {
                let mut out = s.as_bytes().to_vec();
                out.push(0);
                out
            }
            Value::Short(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::Long(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::Long8(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::Undefined(v) => v.clone(),
        }
    }

    /// Widen to a single `u32`, for scalar-valued tags (`ImageWidth`, ...).
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Short(v) => v.first().map(|&x| x as u32),
            Value::Long(v) => v.first().copied(),
            Value::Long8(v) => v.first().and_then(|&x| u32::try_from(x).ok()),
            _ => None,
        }
    }

    /// Widen to a single `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Short(v) => v.first().map(|&x| x as u64),
            Value::Long(v) => v.first().map(|&x| x as u64),
            Value::Long8(v) => v.first().copied(),
            _ => None,
        }
    }

    /// Widen an array-valued tag (`TileOffsets`, `SubIFDs`, ...) to `u64`.
    pub fn as_u64_vec(&self) -> Option<Vec<u64>> {
        match self {
            Value::Short(v) => Some(v.iter().map(|&x| x as u64).collect()),
            Value::Long(v) => Some(v.iter().map(|&x| x as u64).collect()),
            Value::Long8(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn as_ascii(&self) -> Option<&str> {
        match self {
            Value::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// Choose `Long` for classic files and `Long8` for BigTIFF, the
    /// encoding the writer uses for offset/byte-count arrays (§4.E.2).
    pub fn offsets(values: &[u64], is_bigtiff: bool) -> Value {
        if is_bigtiff {
            Value::Long8(values.to_vec())
        } else {
            Value::Long(values.iter().map(|&v| v as u32).collect())
        }
    }
}

/// One IFD: a tag-sorted set of entries plus the SubIFD children used for
/// pyramid sub-resolutions.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: BTreeMap<u16, Value>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: TiffTag, value: Value) -> &mut Self {
        self.entries.insert(tag.as_u16(), value);
        self
    }

    pub fn insert_raw(&mut self, tag: u16, value: Value) -> &mut Self {
        self.entries.insert(tag, value);
        self
    }

    pub fn get(&self, tag: TiffTag) -> Option<&Value> {
        self.entries.get(&tag.as_u16())
    }

    /// Entries in ascending tag-id order, as the writer must emit them.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Value)> {
        self.entries.iter().map(|(&tag, value)| (tag, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn image_width(&self) -> Option<u32> {
        self.get(TiffTag::ImageWidth).and_then(Value::as_u32)
    }

    pub fn image_height(&self) -> Option<u32> {
        self.get(TiffTag::ImageLength).and_then(Value::as_u32)
    }

    pub fn tile_width(&self) -> Option<u32> {
        self.get(TiffTag::TileWidth).and_then(Value::as_u32)
    }

    pub fn tile_height(&self) -> Option<u32> {
        self.get(TiffTag::TileLength).and_then(Value::as_u32)
    }

    pub fn rows_per_strip(&self) -> Option<u32> {
        self.get(TiffTag::RowsPerStrip).and_then(Value::as_u32)
    }

    pub fn is_tiled(&self) -> bool {
        self.get(TiffTag::TileWidth).is_some()
    }

    pub fn bits_per_sample(&self) -> Option<u16> {
        self.get(TiffTag::BitsPerSample)
            .and_then(Value::as_u32)
            .map(|v| v as u16)
    }

    pub fn compression(&self) -> Compression {
        self.get(TiffTag::Compression)
            .and_then(Value::as_u32)
            .and_then(|v| Compression::from_u16(v as u16))
            .unwrap_or(Compression::None)
    }

    pub fn is_sub_resolution(&self) -> bool {
        self.get(TiffTag::NewSubfileType)
            .and_then(Value::as_u32)
            .map(|v| v & 1 == 1)
            .unwrap_or(false)
    }

    pub fn sub_ifd_offsets(&self) -> Option<Vec<u64>> {
        self.get(TiffTag::SubIFDs).and_then(Value::as_u64_vec)
    }

    pub fn image_description(&self) -> Option<&str> {
        self.get(TiffTag::ImageDescription).and_then(Value::as_ascii)
    }

    pub fn sample_format(&self) -> u16 {
        self.get(TiffTag::SampleFormat)
            .and_then(Value::as_u32)
            .map(|v| v as u16)
            .unwrap_or(1) // unsigned integer, the TIFF default
    }
}
