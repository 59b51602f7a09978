use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::byte_source::{check_cancelled, check_range};
use super::ByteSource;
use crate::error::IoError;

/// A [`ByteSource`] backed by an owned, in-memory buffer.
///
/// Used for writer-side verification and for tests; no I/O is ever
/// performed, so cancellation only matters if the token is already
/// cancelled at call time.
#[derive(Clone)]
pub struct MemoryByteSource {
    data: Bytes,
    identifier: String,
}

impl MemoryByteSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            identifier: "memory://buffer".to_string(),
        }
    }

    pub fn with_identifier(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }
}

#[async_trait]
impl ByteSource for MemoryByteSource {
    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read(
        &self,
        offset: u64,
        len: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes, IoError> {
        check_cancelled(cancel)?;
        check_range(offset, len, self.length())?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_exact_slice() {
        let src = MemoryByteSource::new(Bytes::from_static(b"0123456789"));
        let got = src.read(3, 4, None).await.unwrap();
        assert_eq!(&got[..], b"3456");
    }

    #[tokio::test]
    async fn rejects_out_of_bounds() {
        let src = MemoryByteSource::new(Bytes::from_static(b"01234"));
        assert!(matches!(
            src.read(3, 10, None).await,
            Err(IoError::RangeOutOfBounds { .. })
        ));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let src = MemoryByteSource::new(Bytes::from_static(b"01234"));
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            src.read(0, 1, Some(&token)).await,
            Err(IoError::Cancelled)
        ));
    }
}
