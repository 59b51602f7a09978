//! TIFF/BigTIFF header parsing and geometry constants.
//!
//! Only little-endian (`"II"`) files are recognised, on both the read and
//! write side: the writer never emits big-endian output, and reading a
//! big-endian TIFF is out of scope (see DESIGN.md).

use crate::error::BridgeError;
use crate::io::{read_u16_le, read_u32_le, read_u64_le};

/// Magic bytes for little-endian ("Intel") byte order.
const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;

/// Version number for classic TIFF.
const VERSION_TIFF: u16 = 42;

/// Version number for BigTIFF.
const VERSION_BIGTIFF: u16 = 43;

/// Size of the classic TIFF header in bytes.
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of the BigTIFF header in bytes.
pub const BIGTIFF_HEADER_SIZE: usize = 16;

/// A parsed TIFF file header: enough to begin walking the IFD chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Whether this is a BigTIFF file (64-bit offsets).
    pub is_bigtiff: bool,

    /// Absolute offset of the first IFD.
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a header from raw bytes. `bytes` must contain at least
    /// [`TIFF_HEADER_SIZE`] bytes (classic) or [`BIGTIFF_HEADER_SIZE`]
    /// bytes (BigTIFF, detected from the version field).
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, BridgeError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(BridgeError::TruncatedFile {
                needed: TIFF_HEADER_SIZE as u64,
                available: bytes.len() as u64,
            });
        }

        let magic = read_u16_le(&bytes[0..2]);
        if magic != BYTE_ORDER_LITTLE_ENDIAN {
            return Err(BridgeError::BadMagic(magic));
        }

        let version = read_u16_le(&bytes[2..4]);
        match version {
            VERSION_TIFF => {
                let first_ifd_offset = read_u32_le(&bytes[4..8]) as u64;
                if first_ifd_offset >= file_size {
                    return Err(BridgeError::BadOffset(first_ifd_offset));
                }
                Ok(TiffHeader {
                    is_bigtiff: false,
                    first_ifd_offset,
                })
            }
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(BridgeError::TruncatedFile {
                        needed: BIGTIFF_HEADER_SIZE as u64,
                        available: bytes.len() as u64,
                    });
                }
                let offset_size = read_u16_le(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(BridgeError::BadTagType {
                        tag: 0,
                        type_code: offset_size,
                    });
                }
                let first_ifd_offset = read_u64_le(&bytes[8..16]);
                if first_ifd_offset >= file_size {
                    return Err(BridgeError::BadOffset(first_ifd_offset));
                }
                Ok(TiffHeader {
                    is_bigtiff: true,
                    first_ifd_offset,
                })
            }
            _ => Err(BridgeError::BadMagic(version)),
        }
    }

    /// Size in bytes of the header this file format writes.
    pub const fn header_size(is_bigtiff: bool) -> usize {
        if is_bigtiff {
            BIGTIFF_HEADER_SIZE
        } else {
            TIFF_HEADER_SIZE
        }
    }

    /// Size of an IFD entry: 12 bytes classic, 20 bytes BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Size of the entry-count field preceding an IFD's entries.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of the next-IFD offset field following an IFD's entries.
    #[inline]
    pub const fn ifd_next_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Size of the value/offset field within a single IFD entry; also the
    /// inline-value threshold.
    #[inline]
    pub const fn value_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Serialize the header bytes (without the first-IFD offset, which
    /// the writer patches in once placement is known).
    pub fn write_prefix(is_bigtiff: bool, out: &mut Vec<u8>) {
        out.extend_from_slice(&[0x49, 0x49]);
        if is_bigtiff {
            out.extend_from_slice(&VERSION_BIGTIFF.to_le_bytes());
            out.extend_from_slice(&8u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
        } else {
            out.extend_from_slice(&VERSION_TIFF.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_classic_header() {
        let header = [0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        let parsed = TiffHeader::parse(&header, 1000).unwrap();
        assert!(!parsed.is_bigtiff);
        assert_eq!(parsed.first_ifd_offset, 8);
    }

    #[test]
    fn parse_bigtiff_header() {
        let header = [
            0x49, 0x49, 0x2B, 0x00, 0x08, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];
        let parsed = TiffHeader::parse(&header, 1000).unwrap();
        assert!(parsed.is_bigtiff);
        assert_eq!(parsed.first_ifd_offset, 16);
    }

    #[test]
    fn rejects_big_endian_marker() {
        let header = [0x4D, 0x4D, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08];
        assert!(matches!(
            TiffHeader::parse(&header, 1000),
            Err(BridgeError::BadMagic(0x4D4D))
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let header = [0x49, 0x49, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00];
        assert!(matches!(
            TiffHeader::parse(&header, 1000),
            Err(BridgeError::BadMagic(0))
        ));
    }

    #[test]
    fn rejects_ifd_offset_past_eof() {
        let header = [0x49, 0x49, 0x2A, 0x00, 0xE8, 0x03, 0x00, 0x00];
        assert!(matches!(
            TiffHeader::parse(&header, 500),
            Err(BridgeError::BadOffset(1000))
        ));
    }

    #[test]
    fn rejects_truncated_header() {
        let header = [0x49, 0x49, 0x2A, 0x00];
        assert!(matches!(
            TiffHeader::parse(&header, 1000),
            Err(BridgeError::TruncatedFile { needed: 8, available: 4 })
        ));
    }

    #[test]
    fn entry_geometry_matches_format() {
        let classic = TiffHeader {
            is_bigtiff: false,
            first_ifd_offset: 8,
        };
        assert_eq!(classic.ifd_entry_size(), 12);
        assert_eq!(classic.ifd_count_size(), 2);
        assert_eq!(classic.value_offset_size(), 4);

        let big = TiffHeader {
            is_bigtiff: true,
            first_ifd_offset: 16,
        };
        assert_eq!(big.ifd_entry_size(), 20);
        assert_eq!(big.ifd_count_size(), 8);
        assert_eq!(big.value_offset_size(), 8);
    }
}
