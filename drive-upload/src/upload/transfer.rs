use std::io;

use futures_util::{TryStreamExt, stream};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::selection::UploadSource;
use super::throughput::ByteCounter;

const MEMORY_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("transfer cancelled")]
    Cancelled,
}

/// Raw binary PUT to pre-signed destinations.
#[derive(Clone)]
pub struct TransferClient {
    http: Client,
}

impl TransferClient {
    pub fn new() -> Self {
        Self::with_http(Client::new())
    }

    pub fn with_http(http: Client) -> Self {
        Self { http }
    }

    /// Streams `source` to `url`, counting every chunk into `counter`.
    /// Cancelling `cancel` drops the in-flight request.
    pub async fn put_payload(
        &self,
        url: &Url,
        source: &UploadSource,
        content_type: &str,
        counter: &ByteCounter,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let (body, len) = self.body_for(source, counter).await?;
        let request = self
            .http
            .put(url.clone())
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, len)
            .body(body)
            .send();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            response = request => {
                response?.error_for_status()?;
                Ok(())
            }
        }
    }

    async fn body_for(
        &self,
        source: &UploadSource,
        counter: &ByteCounter,
    ) -> Result<(Body, u64), TransferError> {
        let counter = counter.clone();
        match source {
            UploadSource::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                let len = file.metadata().await?.len();
                let stream = ReaderStream::new(file)
                    .inspect_ok(move |chunk| counter.add(chunk.len() as u64));
                Ok((Body::wrap_stream(stream), len))
            }
            UploadSource::Bytes(bytes) => {
                let chunks: Vec<Result<Vec<u8>, io::Error>> = bytes
                    .chunks(MEMORY_CHUNK)
                    .map(|chunk| Ok(chunk.to_vec()))
                    .collect();
                let stream = stream::iter(chunks)
                    .inspect_ok(move |chunk| counter.add(chunk.len() as u64));
                Ok((Body::wrap_stream(stream), bytes.len() as u64))
            }
        }
    }
}

impl Default for TransferClient {
    fn default() -> Self {
        Self::new()
    }
}
