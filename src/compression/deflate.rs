//! zlib-wrapped deflate codec (RFC 1950 framing of RFC 1951), the only
//! compression scheme the bridge can decode or emit (TIFF compression
//! code 8 / Adobe's 32946, both byte-compatible zlib streams).

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression as Flate2Compression;
use std::io::{Read, Write};

use crate::error::BridgeError;

/// Default compression level used by the writer; matches what a generic
/// zlib encoder at level 6 produces, so cross-decoder round-trips hold.
pub const DEFAULT_LEVEL: u32 = 6;

/// Compress `data` at `level` (clamped to `1..=9`), returning a
/// zlib-wrapped deflate stream beginning with the `0x78` CMF byte.
pub fn compress(data: &[u8], level: u32) -> Vec<u8> {
    let level = level.clamp(1, 9);
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Flate2Compression::new(level));
    encoder
        .write_all(data)
        .expect("writing to an in-memory encoder cannot fail");
    encoder
        .finish()
        .expect("finishing an in-memory encoder cannot fail")
}

/// Decompress a zlib-wrapped deflate stream produced by [`compress`] or
/// any standard zlib encoder.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, BridgeError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| BridgeError::CompressionCorrupt(e.to_string()))?;
    Ok(out)
}

/// Decompress into a caller-sized buffer, failing if the decoded length
/// doesn't match exactly (used for tile reads, where the expected size is
/// known from the tile geometry).
pub fn decompress_exact(data: &[u8], expected_len: usize) -> Result<Vec<u8>, BridgeError> {
    let out = decompress(data)?;
    if out.len() != expected_len {
        return Err(BridgeError::CompressionCorrupt(format!(
            "expected {expected_len} bytes, decoded {}",
            out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_at_every_level() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        for level in 1..=9 {
            let compressed = compress(&data, level);
            assert_eq!(compressed[0], 0x78, "zlib CMF byte at level {level}");
            let decompressed = decompress(&compressed).unwrap();
            assert_eq!(decompressed, data);
        }
    }

    #[test]
    fn deterministic_for_fixed_level_and_input() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(32);
        let a = compress(&data, DEFAULT_LEVEL);
        let b = compress(&data, DEFAULT_LEVEL);
        assert_eq!(a, b);
    }

    #[test]
    fn decompress_rejects_garbage() {
        let garbage = [0xFFu8; 16];
        assert!(decompress(&garbage).is_err());
    }

    #[test]
    fn decompress_exact_checks_length() {
        let data = vec![7u8; 1024];
        let compressed = compress(&data, DEFAULT_LEVEL);
        assert!(decompress_exact(&compressed, 1024).is_ok());
        assert!(decompress_exact(&compressed, 999).is_err());
    }
}
