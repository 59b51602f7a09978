//! Opening a TIFF file, walking its IFD chain, and reading tile/strip
//! pixel data through it.
//!
//! Parsed IFDs are cached keyed by their absolute file offset (§3,
//! "Lifecycles"); this mirrors the singleflight block cache the teacher
//! keeps over raw byte ranges (`io::block_cache`), simplified to a plain
//! LRU since an IFD, once decoded, has no further fetch cost to dedupe.

use std::sync::Mutex;

use lru::LruCache;
use tokio_util::sync::CancellationToken;

use crate::compression::deflate;
use crate::error::BridgeError;
use crate::io::ByteSource;

use super::header::{TiffHeader, BIGTIFF_HEADER_SIZE};
use super::ifd::Directory;
use super::tags::{Compression, TiffTag};
use super::value::{RawEntry, ValueReader};

const IFD_CACHE_SIZE: usize = 64;

/// One parsed IFD plus the absolute offset it was read from (the cache
/// key and the value stored in a parent's `SubIFDs` array) and the
/// pointer to the next IFD in the main chain.
#[derive(Debug, Clone)]
pub struct Ifd {
    pub offset: u64,
    pub directory: Directory,
    pub next_ifd_offset: u64,
}

/// A TIFF file opened for reading: header plus a cache of parsed IFDs.
pub struct TiffReader<S: ByteSource> {
    source: S,
    header: TiffHeader,
    ifd_cache: Mutex<LruCache<u64, Ifd>>,
}

impl<S: ByteSource> TiffReader<S> {
    pub async fn open(source: S) -> Result<Self, BridgeError> {
        let prefix_len = BIGTIFF_HEADER_SIZE.min(source.length() as usize);
        let bytes = source
            .read(0, prefix_len, None)
            .await
            .map_err(BridgeError::Io)?;
        let header = TiffHeader::parse(&bytes, source.length())?;
        Ok(Self {
            source,
            header,
            ifd_cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(IFD_CACHE_SIZE).unwrap(),
            )),
        })
    }

    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    pub fn byte_source(&self) -> &S {
        &self.source
    }

    /// Offset of the first IFD in the main chain.
    pub fn first_ifd_offset(&self) -> u64 {
        self.header.first_ifd_offset
    }

    /// Parse (or fetch from cache) the IFD at an absolute file offset.
    pub async fn read_ifd_at(
        &self,
        offset: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<Ifd, BridgeError> {
        if let Some(hit) = self.ifd_cache.lock().unwrap().get(&offset) {
            return Ok(hit.clone());
        }

        let ifd = self.parse_ifd_at(offset, cancel).await?;
        self.ifd_cache.lock().unwrap().put(offset, ifd.clone());
        Ok(ifd)
    }

    async fn parse_ifd_at(
        &self,
        offset: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<Ifd, BridgeError> {
        let count_size = self.header.ifd_count_size();
        let count_bytes = self
            .source
            .read(offset, count_size, cancel)
            .await
            .map_err(BridgeError::Io)?;
        let entry_count = if self.header.is_bigtiff {
            crate::io::read_u64_le(&count_bytes)
        } else {
            crate::io::read_u16_le(&count_bytes) as u64
        };

        let entry_size = self.header.ifd_entry_size();
        let entries_offset = offset + count_size as u64;
        let entries_len = entry_size * entry_count as usize;
        let entries_bytes = self
            .source
            .read(entries_offset, entries_len, cancel)
            .await
            .map_err(BridgeError::Io)?;

        let value_offset_size = self.header.value_offset_size();
        let value_reader = ValueReader::new(&self.source, &self.header);
        let mut directory = Directory::new();

        for i in 0..entry_count as usize {
            let base = i * entry_size;
            let tag = crate::io::read_u16_le(&entries_bytes[base..base + 2]);
            let field_type_raw = crate::io::read_u16_le(&entries_bytes[base + 2..base + 4]);
            let count = if self.header.is_bigtiff {
                crate::io::read_u64_le(&entries_bytes[base + 4..base + 12])
            } else {
                crate::io::read_u32_le(&entries_bytes[base + 4..base + 8]) as u64
            };
            let value_start = base + entry_size - value_offset_size;
            let value_or_offset = entries_bytes[value_start..value_start + value_offset_size].to_vec();

            let raw = RawEntry {
                tag,
                field_type_raw,
                count,
                value_or_offset,
            };

            match value_reader.resolve(&raw, cancel).await {
                Ok(value) => {
                    directory.insert_raw(tag, value);
                }
                Err(BridgeError::BadTagType { .. }) => continue, // unknown type: skip, not fatal
                Err(e) => return Err(e),
            }
        }

        let next_offset_size = self.header.ifd_next_offset_size();
        let next_offset_pos = entries_offset + entries_len as u64;
        let next_bytes = self
            .source
            .read(next_offset_pos, next_offset_size, cancel)
            .await
            .map_err(BridgeError::Io)?;
        let next_ifd_offset = if self.header.is_bigtiff {
            crate::io::read_u64_le(&next_bytes)
        } else {
            crate::io::read_u32_le(&next_bytes) as u64
        };

        Ok(Ifd {
            offset,
            directory,
            next_ifd_offset,
        })
    }

    /// Walk the main IFD chain from the header's first-IFD offset,
    /// returning every IFD in file order. SubIFDs are not included.
    pub async fn read_main_chain(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<Ifd>, BridgeError> {
        let mut chain = Vec::new();
        let mut offset = self.header.first_ifd_offset;
        while offset != 0 {
            let ifd = self.read_ifd_at(offset, cancel).await?;
            let next = ifd.next_ifd_offset;
            chain.push(ifd);
            offset = next;
        }
        Ok(chain)
    }

    /// Read one tile (or, for stripped files, one strip) by index,
    /// decompressing it if necessary. `expected_len` is the uncompressed
    /// size, known from the tile geometry.
    pub async fn read_block(
        &self,
        ifd: &Ifd,
        block_index: usize,
        expected_len: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<u8>, BridgeError> {
        let (offsets_tag, counts_tag) = if ifd.directory.is_tiled() {
            (TiffTag::TileOffsets, TiffTag::TileByteCounts)
        } else {
            (TiffTag::StripOffsets, TiffTag::StripByteCounts)
        };

        let offsets = ifd
            .directory
            .get(offsets_tag)
            .and_then(super::ifd::Value::as_u64_vec)
            .ok_or_else(|| {
                BridgeError::UnsupportedTagCombination("missing offsets tag".to_string())
            })?;
        let counts = ifd
            .directory
            .get(counts_tag)
            .and_then(super::ifd::Value::as_u64_vec)
            .ok_or_else(|| {
                BridgeError::UnsupportedTagCombination("missing byte-counts tag".to_string())
            })?;

        if offsets.len() != counts.len() || block_index >= offsets.len() {
            return Err(BridgeError::UnsupportedTagCombination(
                "offsets/byte-counts count mismatch".to_string(),
            ));
        }

        let raw = self
            .source
            .read(offsets[block_index], counts[block_index] as usize, cancel)
            .await
            .map_err(BridgeError::Io)?;

        match ifd.directory.compression() {
            Compression::None => Ok(raw.to_vec()),
            Compression::Deflate | Compression::AdobeDeflate => {
                deflate::decompress_exact(&raw, expected_len)
            }
            other => Err(BridgeError::UnsupportedTagCombination(format!(
                "unsupported compression scheme: {}",
                other.name()
            ))),
        }
    }

    /// Decode a pixel window `[left, top, right, bottom)` from a tiled
    /// IFD into a caller-owned, densely packed row-major buffer.
    pub async fn read_window(
        &self,
        ifd: &Ifd,
        bytes_per_pixel: usize,
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<u8>, BridgeError> {
        let width = ifd
            .directory
            .image_width()
            .ok_or_else(|| BridgeError::UnsupportedTagCombination("missing ImageWidth".into()))?;
        let height = ifd
            .directory
            .image_height()
            .ok_or_else(|| BridgeError::UnsupportedTagCombination("missing ImageLength".into()))?;
        let is_tiled = ifd.directory.is_tiled();
        let tile_w = if is_tiled {
            ifd.directory.tile_width().unwrap_or(width)
        } else {
            width
        };
        let tile_h = if is_tiled {
            ifd.directory.tile_height().unwrap_or(height)
        } else {
            ifd.directory.rows_per_strip().unwrap_or(height)
        };
        let tiles_x = width.div_ceil(tile_w);

        let win_w = (right - left) as usize;
        let win_h = (bottom - top) as usize;
        let mut out = vec![0u8; win_w * win_h * bytes_per_pixel];

        let first_tile_x = left / tile_w;
        let last_tile_x = (right.saturating_sub(1)) / tile_w;
        let first_tile_y = top / tile_h;
        let last_tile_y = (bottom.saturating_sub(1)) / tile_h;

        for tile_y in first_tile_y..=last_tile_y {
            for tile_x in first_tile_x..=last_tile_x {
                let tile_index = (tile_y * tiles_x + tile_x) as usize;
                let expected_len = (tile_w * tile_h) as usize * bytes_per_pixel;
                let tile_bytes = self
                    .read_block(ifd, tile_index, expected_len, cancel)
                    .await?;

                let tile_left = tile_x * tile_w;
                let tile_top = tile_y * tile_h;

                let overlap_left = left.max(tile_left);
                let overlap_right = right.min(tile_left + tile_w).min(width);
                let overlap_top = top.max(tile_top);
                let overlap_bottom = bottom.min(tile_top + tile_h).min(height);
                if overlap_left >= overlap_right || overlap_top >= overlap_bottom {
                    continue;
                }

                for row in overlap_top..overlap_bottom {
                    let src_row_start =
                        ((row - tile_top) * tile_w + (overlap_left - tile_left)) as usize
                            * bytes_per_pixel;
                    let dst_row_start =
                        ((row - top) as usize * win_w + (overlap_left - left) as usize)
                            * bytes_per_pixel;
                    let len = (overlap_right - overlap_left) as usize * bytes_per_pixel;
                    out[dst_row_start..dst_row_start + len]
                        .copy_from_slice(&tile_bytes[src_row_start..src_row_start + len]);
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryByteSource;

    #[tokio::test]
    async fn open_rejects_bad_magic() {
        let source = MemoryByteSource::new(vec![0u8; 16]);
        assert!(TiffReader::open(source).await.is_err());
    }

    #[tokio::test]
    async fn open_classic_header_with_zero_ifds() {
        // Header only, first_ifd_offset points at an IFD with 0 entries.
        let mut data = vec![0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        data.extend_from_slice(&0u16.to_le_bytes()); // entry count 0
        data.extend_from_slice(&0u32.to_le_bytes()); // next IFD offset
        let source = MemoryByteSource::new(data);
        let reader = TiffReader::open(source).await.unwrap();
        let chain = reader.read_main_chain(None).await.unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain[0].directory.is_empty());
    }
}
