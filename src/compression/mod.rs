//! Compression codecs for TIFF tile/strip data.

pub mod deflate;

pub use deflate::{compress, decompress};
