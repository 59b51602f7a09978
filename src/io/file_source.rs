use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::byte_source::{check_cancelled, check_range};
use super::ByteSource;
use crate::error::IoError;

/// A [`ByteSource`] backed by a local file.
///
/// The file handle is shared behind a mutex and seeked before each read;
/// the bridge never issues overlapping reads against the same handle
/// concurrently from a single `FileByteSource`; callers that want
/// concurrent reads open one instance per task, or serialize through the
/// IFD/tile caches upstream.
pub struct FileByteSource {
    file: Mutex<File>,
    size: u64,
    identifier: String,
}

impl FileByteSource {
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| IoError::Transport(format!("opening {}: {e}", path.display())))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| IoError::Transport(e.to_string()))?
            .len();
        Ok(Self {
            file: Mutex::new(file),
            size,
            identifier: path.display().to_string(),
        })
    }
}

#[async_trait]
impl ByteSource for FileByteSource {
    fn length(&self) -> u64 {
        self.size
    }

    async fn read(
        &self,
        offset: u64,
        len: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes, IoError> {
        check_cancelled(cancel)?;
        check_range(offset, len, self.size)?;

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| IoError::Transport(e.to_string()))?;

        let mut buf = BytesMut::zeroed(len);
        file.read_exact(&mut buf)
            .await
            .map_err(|e| IoError::Transport(e.to_string()))?;

        check_cancelled(cancel)?;
        Ok(buf.freeze())
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
