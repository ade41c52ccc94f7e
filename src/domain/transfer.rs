//! HTTP file transfer domain types
//!
//! Transfer states, the auto-accept policy and the persisted resume records
//! that let a transfer survive a process restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::session::{Direction, ReasonCode};
use crate::domain::shared::value_objects::{ContactId, ContentDescriptor, TransferId};

/// Why a transfer is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseReason {
    /// Paused on user request; resumable in place
    ByUser,
    /// Paused by the stack (connectivity loss); resumable only by
    /// reconstructing the session from its persisted resume record
    BySystem,
}

/// HTTP file transfer session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileTransferState {
    /// Outgoing transfer waiting for dispatch
    Queued,
    /// Incoming transfer waiting for a local answer
    Invited,
    /// Accepted, transfer not yet streaming
    Accepting,
    /// Bytes are flowing
    Started,
    /// Streaming suspended
    Paused(PauseReason),
    /// All bytes delivered
    Transferred,
    /// Invitation rejected
    Rejected,
    /// Ended on local or remote request
    Aborted,
    /// Ended on error
    Failed,
}

impl FileTransferState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &FileTransferState) -> bool {
        use FileTransferState::*;

        match (self, new_state) {
            (Queued, Started) | (Queued, Accepting) => true,
            (Queued, Rejected) | (Queued, Aborted) | (Queued, Failed) => true,

            (Invited, Accepting) => true,
            (Invited, Rejected) | (Invited, Aborted) | (Invited, Failed) => true,

            (Accepting, Started) => true,
            (Accepting, Rejected) | (Accepting, Aborted) | (Accepting, Failed) => true,

            (Started, Paused(_)) => true,
            (Started, Transferred) | (Started, Aborted) | (Started, Failed) => true,

            (Paused(_), Started) => true,
            (Paused(_), Aborted) | (Paused(_), Failed) => true,

            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileTransferState::Transferred
                | FileTransferState::Rejected
                | FileTransferState::Aborted
                | FileTransferState::Failed
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            FileTransferState::Queued => "Queued",
            FileTransferState::Invited => "Invited",
            FileTransferState::Accepting => "Accepting",
            FileTransferState::Started => "Started",
            FileTransferState::Paused(PauseReason::ByUser) => "PausedByUser",
            FileTransferState::Paused(PauseReason::BySystem) => "PausedBySystem",
            FileTransferState::Transferred => "Transferred",
            FileTransferState::Rejected => "Rejected",
            FileTransferState::Aborted => "Aborted",
            FileTransferState::Failed => "Failed",
        }
    }
}

/// Decide whether an incoming transfer is accepted without user interaction.
///
/// Evaluated once per session. A content size above the warning threshold
/// always forces manual acceptance; otherwise the roaming-specific flag wins
/// while roaming and the general flag otherwise.
pub fn should_auto_accept(
    warn_size: u64,
    content_size: u64,
    is_roaming: bool,
    auto_accept_in_roaming: bool,
    auto_accept: bool,
) -> bool {
    if warn_size > 0 && content_size > warn_size {
        return false;
    }
    if is_roaming {
        return auto_accept_in_roaming;
    }
    auto_accept
}

/// Persisted handoff state of an HTTP transfer
///
/// Written when a transfer is queued or invited, read back to rebuild the
/// session after an interruption, deleted on terminal states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtHttpResume {
    pub direction: Direction,
    pub contact: ContactId,
    pub chat_id: Option<String>,
    pub transfer_id: TransferId,
    pub file: ContentDescriptor,
    pub icon: Option<ContentDescriptor>,
    /// Download or upload server address
    pub server_address: String,
    pub file_expiration: DateTime<Utc>,
    pub icon_expiration: Option<DateTime<Utc>>,
    /// Whether the local user already accepted the transfer
    pub is_accepted: bool,
    /// Last acknowledged byte offset
    pub offset: u64,
    pub timestamp: DateTime<Utc>,
}

/// File sharing errors
#[derive(Error, Debug, Clone)]
pub enum FileSharingError {
    #[error("Media download failed: {0}")]
    MediaDownloadFailed(String),

    #[error("Media upload failed: {0}")]
    MediaUploadFailed(String),

    #[error("Media saving failed: {0}")]
    MediaSavingFailed(String),

    #[error("Not enough storage space")]
    NotEnoughStorageSpace,

    #[error("Session initiation failed: {0}")]
    SessionInitiationFailed(String),

    #[error("No chat session available")]
    NoChatSession,

    #[error("Media size too big")]
    MediaSizeTooBig,

    #[error("Session initiation declined")]
    SessionInitiationDeclined,

    #[error("Session initiation cancelled")]
    SessionInitiationCancelled,
}

impl FileSharingError {
    /// Terminal state and reason code for this error; total by construction.
    pub fn reason(&self) -> (FileTransferState, ReasonCode) {
        match self {
            FileSharingError::MediaDownloadFailed(_)
            | FileSharingError::MediaUploadFailed(_)
            | FileSharingError::MediaSavingFailed(_) => {
                (FileTransferState::Failed, ReasonCode::MediaFailed)
            }
            FileSharingError::NotEnoughStorageSpace | FileSharingError::MediaSizeTooBig => {
                (FileTransferState::Failed, ReasonCode::RejectedBySystem)
            }
            FileSharingError::SessionInitiationFailed(_) | FileSharingError::NoChatSession => {
                (FileTransferState::Failed, ReasonCode::InitiationFailed)
            }
            FileSharingError::SessionInitiationDeclined => {
                (FileTransferState::Rejected, ReasonCode::RejectedByUser)
            }
            FileSharingError::SessionInitiationCancelled => {
                (FileTransferState::Rejected, ReasonCode::RejectedByRemote)
            }
        }
    }
}
