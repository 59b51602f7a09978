//! Error types for the OME-TIFF / OME-Zarr bridge.
//!
//! Follows the same layered shape as most byte-format crates: a small
//! `IoError` for the byte-source boundary, and a top-level `BridgeError`
//! that every other module's `Result` resolves to. Conversions are derived
//! with `#[from]` so `?` composes across layers without manual mapping.

use thiserror::Error;

/// Errors surfaced by a [`crate::io::ByteSource`] implementation.
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// The requested range extends past the end of the resource.
    #[error("truncated read: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// The underlying transport (file, socket, HTTP client) failed.
    #[error("byte source error: {0}")]
    Transport(String),

    /// The operation observed cooperative cancellation.
    #[error("cancelled")]
    Cancelled,
}

/// The exhaustive set of error kinds the bridge can produce.
///
/// Every variant corresponds 1:1 to an error kind named in the
/// specification: format-level read failures, IFD parse failures,
/// OME-XML failures, dtype/indexer lookups, compression, and size limits.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Propagated from the byte source.
    #[error(transparent)]
    Io(#[from] IoError),

    /// The file ends before all declared structures could be read.
    #[error("truncated file: expected at least {needed} bytes, have {available}")]
    TruncatedFile { needed: u64, available: u64 },

    /// Byte order marker is neither `II` nor the bridge's emitted `II`, or
    /// the version field is neither 42 nor 43.
    #[error("bad magic: {0:#06x}")]
    BadMagic(u16),

    /// An absolute offset read from the file is out of range or otherwise
    /// unreachable.
    #[error("bad offset: {0}")]
    BadOffset(u64),

    /// An IFD entry declared a TIFF type code this codec does not
    /// recognise, or a count inconsistent with its type.
    #[error("bad tag type: tag {tag} declared type {type_code}")]
    BadTagType { tag: u16, type_code: u16 },

    /// An IFD mixes strip and tile tags, or is missing required
    /// counterpart tags (offsets without byte counts, etc).
    #[error("unsupported tag combination: {0}")]
    UnsupportedTagCombination(String),

    /// `DimensionOrder` is not one of the six permutations of `{Z, C, T}`
    /// prefixed by `XY`.
    #[error("invalid dimension order: {0}")]
    InvalidDimensionOrder(String),

    /// The `ImageDescription` text is not recognisable OME-XML, or a
    /// required attribute is malformed.
    #[error("invalid OME-XML: {0}")]
    InvalidXml(String),

    /// The combination of TIFF sample format and bit depth (or the OME
    /// `Type` string) has no corresponding array element type.
    #[error("unsupported dtype: {0}")]
    UnsupportedDtype(String),

    /// A pyramid level index is out of `[0, levels)`, or a SubIFD entry
    /// referenced by that index is missing.
    #[error("no such level: {0}")]
    NoSuchLevel(usize),

    /// A `(c, z, t)` selection has no corresponding IFD.
    #[error("no such plane: c={c} z={z} t={t}")]
    NoSuchPlane { c: usize, z: usize, t: usize },

    /// Deflate decompression failed or produced an unexpected byte count.
    #[error("compression corrupt: {0}")]
    CompressionCorrupt(String),

    /// A classic-format (32-bit offset) write would exceed `2^32 - 2`.
    #[error("file too large for classic TIFF: computed size {0} bytes")]
    FileTooLarge(u64),

    /// The operation observed cooperative cancellation.
    #[error("cancelled")]
    Cancelled,
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<std::num::TryFromIntError> for BridgeError {
    fn from(_: std::num::TryFromIntError) -> Self {
        BridgeError::BadOffset(u64::MAX)
    }
}
