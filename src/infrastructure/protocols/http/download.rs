//! Resumable HTTP download
//!
//! Streams a remote file to local storage. The stream can be paused or
//! aborted between chunks; the byte offset reached at the boundary is
//! reported back so a later attempt can resume with a Range request.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::RANGE;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use super::{HttpTransferError, TransferOutcome};

/// Progress callback: (transferred bytes, total bytes)
pub type ProgressFn<'a> = &'a mut (dyn FnMut(u64, u64) + Send);

pub struct HttpDownloadManager {
    client: reqwest::Client,
    paused: AtomicBool,
    aborted: AtomicBool,
}

impl HttpDownloadManager {
    pub fn new(connect_timeout: Duration) -> Result<Self, HttpTransferError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| HttpTransferError::Network(e.to_string()))?;
        Ok(Self {
            client,
            paused: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
        })
    }

    /// Request a pause at the next chunk boundary
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Request an abort at the next chunk boundary
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Clear pause/abort requests before a new attempt
    pub fn reset(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.aborted.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Download `url` into `dest`, starting at `offset`.
    ///
    /// `total` is the expected full size, used for progress reporting. The
    /// local file is truncated to `offset` first so a resumed download never
    /// duplicates bytes.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        offset: u64,
        total: u64,
        progress: ProgressFn<'_>,
    ) -> Result<TransferOutcome, HttpTransferError> {
        debug!("Download {} -> {:?} from offset {}", url, dest, offset);

        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", offset));
        }
        let response = request
            .send()
            .await
            .map_err(|e| HttpTransferError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            warn!("Download of {} failed with HTTP {}", url, status.as_u16());
            return Err(HttpTransferError::Status(status.as_u16()));
        }
        let mut stream = response.bytes_stream();

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(dest)
            .await?;
        file.set_len(offset).await?;
        file.seek(SeekFrom::End(0)).await?;

        let mut current = offset;
        loop {
            if self.aborted.load(Ordering::SeqCst) {
                file.flush().await?;
                return Ok(TransferOutcome::Aborted(current));
            }
            if self.paused.load(Ordering::SeqCst) {
                file.flush().await?;
                debug!("Download paused at offset {}", current);
                return Ok(TransferOutcome::Paused(current));
            }

            let Some(chunk) = stream.next().await else {
                break;
            };
            let chunk = chunk.map_err(|e| HttpTransferError::Network(e.to_string()))?;
            file.write_all(&chunk).await?;
            current += chunk.len() as u64;
            progress(current, total);
        }

        file.flush().await?;
        Ok(TransferOutcome::Complete(current))
    }

    /// Fetch a file icon; small enough to download in one piece
    pub async fn download_thumbnail(
        &self,
        url: &str,
        dest: &Path,
    ) -> Result<(), HttpTransferError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HttpTransferError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpTransferError::Status(status.as_u16()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpTransferError::Network(e.to_string()))?;
        tokio::fs::write(dest, &body).await?;
        Ok(())
    }
}
