//! Decoding a raw IFD entry (tag, type, count, inline-or-offset payload)
//! into a typed [`Value`], fetching the overflow region from the byte
//! source when the payload doesn't fit inline.

use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;
use crate::io::{read_u32_le, read_u64_le, ByteSource};

use super::header::TiffHeader;
use super::ifd::Value;
use super::tags::FieldType;

/// An IFD entry as it appears on the wire, before its payload has been
/// resolved into a [`Value`].
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub tag: u16,
    pub field_type_raw: u16,
    pub count: u64,
    /// The entry's value/offset field, exactly `header.value_offset_size()`
    /// bytes wide.
    pub value_or_offset: Vec<u8>,
}

impl RawEntry {
    pub fn field_type(&self) -> Option<FieldType> {
        FieldType::from_u16(self.field_type_raw)
    }

    fn payload_size(&self, field_type: FieldType) -> u64 {
        field_type.size_in_bytes() as u64 * self.count
    }

    fn is_inline(&self, field_type: FieldType, is_bigtiff: bool) -> bool {
        field_type.fits_inline(self.count, is_bigtiff)
    }

    fn offset(&self) -> u64 {
        if self.value_or_offset.len() == 8 {
            read_u64_le(&self.value_or_offset)
        } else {
            read_u32_le(&self.value_or_offset) as u64
        }
    }
}

/// Resolves [`RawEntry`] payloads against a [`ByteSource`], respecting
/// the current file's classic/BigTIFF inline threshold.
pub struct ValueReader<'a, S: ByteSource> {
    source: &'a S,
    header: &'a TiffHeader,
}

impl<'a, S: ByteSource> ValueReader<'a, S> {
    pub fn new(source: &'a S, header: &'a TiffHeader) -> Self {
        Self { source, header }
    }

    /// Read the raw bytes backing an entry's payload — inline or fetched
    /// from the overflow region.
    pub async fn read_bytes(
        &self,
        entry: &RawEntry,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<u8>, BridgeError> {
        let field_type = entry.field_type().ok_or(BridgeError::BadTagType {
            tag: entry.tag,
            type_code: entry.field_type_raw,
        })?;
        let size = entry.payload_size(field_type) as usize;

        if entry.is_inline(field_type, self.header.is_bigtiff) {
            Ok(entry.value_or_offset[..size.min(entry.value_or_offset.len())].to_vec())
        } else {
            let bytes = self
                .source
                .read(entry.offset(), size, cancel)
                .await
                .map_err(BridgeError::Io)?;
            Ok(bytes.to_vec())
        }
    }

    /// Decode an entry fully into a typed [`Value`].
    pub async fn resolve(
        &self,
        entry: &RawEntry,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, BridgeError> {
        let field_type = entry.field_type().ok_or(BridgeError::BadTagType {
            tag: entry.tag,
            type_code: entry.field_type_raw,
        })?;
        let bytes = self.read_bytes(entry, cancel).await?;
        let count = entry.count as usize;

        let value = match field_type {
            FieldType::Byte => Value::Byte(bytes),
            FieldType::Undefined => Value::Undefined(bytes),
            FieldType::Ascii => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Value::Ascii(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            FieldType::Short => {
                let mut v = Vec::with_capacity(count);
                for chunk in bytes.chunks_exact(2).take(count) {
                    v.push(u16::from_le_bytes([chunk[0], chunk[1]]));
                }
                Value::Short(v)
            }
            FieldType::Long => {
                let mut v = Vec::with_capacity(count);
                for chunk in bytes.chunks_exact(4).take(count) {
                    v.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
                }
                Value::Long(v)
            }
            FieldType::Long8 => {
                let mut v = Vec::with_capacity(count);
                for chunk in bytes.chunks_exact(8).take(count) {
                    v.push(u64::from_le_bytes(chunk.try_into().unwrap()));
                }
                Value::Long8(v)
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryByteSource;

    fn header(is_bigtiff: bool) -> TiffHeader {
        TiffHeader {
            is_bigtiff,
            first_ifd_offset: 8,
        }
    }

    #[tokio::test]
    async fn resolves_inline_short() {
        let source = MemoryByteSource::new(vec![0u8; 16]);
        let h = header(false);
        let reader = ValueReader::new(&source, &h);
        let entry = RawEntry {
            tag: 256,
            field_type_raw: 3,
            count: 1,
            value_or_offset: vec![0x20, 0x00, 0x00, 0x00],
        };
        let value = reader.resolve(&entry, None).await.unwrap();
        assert_eq!(value.as_u32(), Some(32));
    }

    #[tokio::test]
    async fn resolves_offset_array() {
        let mut data = vec![0u8; 200];
        let offsets: [u32; 3] = [100, 200, 300];
        for (i, v) in offsets.iter().enumerate() {
            data[100 + i * 4..100 + i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        let source = MemoryByteSource::new(data);
        let h = header(false);
        let reader = ValueReader::new(&source, &h);
        let entry = RawEntry {
            tag: 324,
            field_type_raw: 4,
            count: 3,
            value_or_offset: 100u32.to_le_bytes().to_vec(),
        };
        let value = reader.resolve(&entry, None).await.unwrap();
        assert_eq!(value.as_u64_vec(), Some(vec![100, 200, 300]));
    }

    #[tokio::test]
    async fn resolves_ascii_with_nul_terminator() {
        let mut data = vec![0u8; 64];
        data[20..20 + 13].copy_from_slice(b"OME-XML here\0");
        let source = MemoryByteSource::new(data);
        let h = header(false);
        let reader = ValueReader::new(&source, &h);
        let entry = RawEntry {
            tag: 270,
            field_type_raw: 2,
            count: 13,
            value_or_offset: 20u32.to_le_bytes().to_vec(),
        };
        let value = reader.resolve(&entry, None).await.unwrap();
        assert_eq!(value.as_ascii(), Some("OME-XML here"));
    }

    #[tokio::test]
    async fn unknown_field_type_errors() {
        let source = MemoryByteSource::new(vec![0u8; 16]);
        let h = header(false);
        let reader = ValueReader::new(&source, &h);
        let entry = RawEntry {
            tag: 256,
            field_type_raw: 99,
            count: 1,
            value_or_offset: vec![0, 0, 0, 0],
        };
        assert!(matches!(
            reader.resolve(&entry, None).await,
            Err(BridgeError::BadTagType { tag: 256, type_code: 99 })
        ));
    }
}
