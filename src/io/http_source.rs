use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::byte_source::{check_cancelled, check_range};
use super::ByteSource;
use crate::error::IoError;

/// A [`ByteSource`] backed by HTTP `Range` requests against a remote URL.
///
/// The resource length is fetched once, via a `HEAD` request, on
/// construction. Every subsequent [`ByteSource::read`] issues a single
/// ranged `GET`.
pub struct HttpRangeByteSource {
    client: reqwest::Client,
    url: String,
    size: u64,
}

impl HttpRangeByteSource {
    pub async fn new(client: reqwest::Client, url: impl Into<String>) -> Result<Self, IoError> {
        let url = url.into();
        let response = client
            .head(&url)
            .send()
            .await
            .map_err(|e| IoError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IoError::Transport(format!(
                "HEAD {url} returned {}",
                response.status()
            )));
        }

        let size = response
            .content_length()
            .ok_or_else(|| IoError::Transport(format!("{url} did not report Content-Length")))?;

        Ok(Self { client, url, size })
    }
}

#[async_trait]
impl ByteSource for HttpRangeByteSource {
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

        let last = offset + len as u64 - 1;
        let response = self
            .client
            .get(&self.url)
            .header("Range", format!("bytes={offset}-{last}"))
            .send()
            .await
            .map_err(|e| IoError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IoError::Transport(format!(
                "GET {} returned {}",
                self.url,
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| IoError::Transport(e.to_string()))?;

        if body.len() != len {
            return Err(IoError::Transport(format!(
                "range request for {len} bytes at {offset} returned {} bytes",
                body.len()
            )));
        }

        check_cancelled(cancel)?;
        Ok(body)
    }

    fn identifier(&self) -> &str {
        &self.url
    }
}
