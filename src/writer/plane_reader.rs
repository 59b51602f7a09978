//! The plane reader: the write-side collaborator (§6.4) supplying dense
//! pixel buffers for the orchestrator to tile and compress.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;

/// Supplies one dense plane at a time, at a given pyramid level.
///
/// Implementations own whatever upstream array or file format the pixels
/// actually come from; the orchestrator never reaches past this trait.
#[async_trait]
pub trait PlaneReader: Send + Sync {
    /// Return the dense element buffer for `(level, c, z, t)`, in
    /// little-endian row-major order, of length exactly
    /// `width(level) * height(level) * bytesPerElement`. No partial
    /// reads.
    async fn read_plane(
        &self,
        level: usize,
        c: usize,
        z: usize,
        t: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes, BridgeError>;
}
