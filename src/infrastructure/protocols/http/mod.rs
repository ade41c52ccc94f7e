//! HTTP content transfer support

pub mod download;
pub mod upload;

use thiserror::Error;

/// Result of a (possibly interrupted) transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All bytes moved; value is the final offset
    Complete(u64),
    /// Stopped on a pause request; value is the resume offset
    Paused(u64),
    /// Stopped on an abort request; value is the offset reached
    Aborted(u64),
}

#[derive(Error, Debug)]
pub enum HttpTransferError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub use download::HttpDownloadManager;
pub use upload::HttpUploadManager;
