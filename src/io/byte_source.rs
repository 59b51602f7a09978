use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::IoError;

/// Random-access read capability over some backing resource.
///
/// This is the bridge's only collaborator for the read path (§6.3): file,
/// HTTP-range, and in-memory backends all implement it, and the TIFF
/// codec is written entirely against the trait rather than any concrete
/// transport.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Total size of the resource in bytes.
    fn length(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with [`IoError::RangeOutOfBounds`] if the range extends past
    /// [`ByteSource::length`]. `cancel`, if provided and already
    /// cancelled, fails the read with [`IoError::Cancelled`] before any
    /// transport call is made; cancellation observed mid-flight still
    /// lets the in-flight read complete (§5) and the caller discards the
    /// result.
    async fn read(
        &self,
        offset: u64,
        len: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes, IoError>;

    /// A short identifier for logging and cache keys (e.g. a file path or
    /// URL).
    fn identifier(&self) -> &str;
}

/// Validate a requested range against a known resource length, the check
/// every concrete [`ByteSource`] performs before touching its transport.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    let end = offset.saturating_add(len as u64);
    if end > size {
        return Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        });
    }
    Ok(())
}

pub(crate) fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<(), IoError> {
    if cancel.is_some_and(|c| c.is_cancelled()) {
        return Err(IoError::Cancelled);
    }
    Ok(())
}
