//! Resumable HTTP upload
//!
//! Pushes a local file to the content server slice by slice, one PUT with a
//! Content-Range per slice. Pause and abort take effect at slice boundaries
//! so the last acknowledged offset is always a clean resume point.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::CONTENT_RANGE;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use super::download::ProgressFn;
use super::{HttpTransferError, TransferOutcome};

pub struct HttpUploadManager {
    client: reqwest::Client,
    server_addr: String,
    slice_size: usize,
    paused: AtomicBool,
    aborted: AtomicBool,
}

impl HttpUploadManager {
    pub fn new(
        server_addr: impl Into<String>,
        connect_timeout: Duration,
        slice_size: usize,
    ) -> Result<Self, HttpTransferError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| HttpTransferError::Network(e.to_string()))?;
        Ok(Self {
            client,
            server_addr: server_addr.into(),
            slice_size: slice_size.max(1),
            paused: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
        })
    }

    /// Address of the content server handling this upload
    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.aborted.store(false, Ordering::SeqCst);
    }

    /// Upload `src` to `url`, starting at `offset`
    pub async fn upload(
        &self,
        url: &str,
        src: &Path,
        offset: u64,
        progress: ProgressFn<'_>,
    ) -> Result<TransferOutcome, HttpTransferError> {
        let total = tokio::fs::metadata(src).await?.len();
        debug!(
            "Upload {:?} ({} bytes) -> {} from offset {}",
            src, total, url, offset
        );

        let mut file = tokio::fs::File::open(src).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut current = offset;
        let mut buffer = vec![0u8; self.slice_size];
        while current < total {
            if self.aborted.load(Ordering::SeqCst) {
                return Ok(TransferOutcome::Aborted(current));
            }
            if self.paused.load(Ordering::SeqCst) {
                debug!("Upload paused at offset {}", current);
                return Ok(TransferOutcome::Paused(current));
            }

            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            let slice_end = current + read as u64 - 1;
            let response = self
                .client
                .put(url)
                .header(
                    CONTENT_RANGE,
                    format!("bytes {}-{}/{}", current, slice_end, total),
                )
                .body(buffer[..read].to_vec())
                .send()
                .await
                .map_err(|e| HttpTransferError::Network(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                warn!("Upload slice failed with HTTP {}", status.as_u16());
                return Err(HttpTransferError::Status(status.as_u16()));
            }

            current += read as u64;
            progress(current, total);
        }

        Ok(TransferOutcome::Complete(current))
    }
}
