//! Session listener interfaces
//!
//! Implemented by the public API layer. Callbacks run synchronously on the
//! session worker task, in transition order; the receiver dispatches onto
//! its own thread if it needs to.

use chrono::{DateTime, Utc};

use crate::domain::session::{ContentSharingError, TerminationReason};
use crate::domain::shared::value_objects::ContentDescriptor;
use crate::domain::transfer::{FileSharingError, PauseReason};

/// Listener for SIP-signalled content sharing sessions (image, video)
pub trait ContentSharingListener: Send + Sync {
    /// Incoming invitation presented for a manual answer
    fn on_session_invited(&self, content: &ContentDescriptor);

    /// 180 Ringing received for an outgoing invitation
    fn on_session_ringing(&self) {}

    fn on_session_accepted(&self);

    /// Dialog established, media flowing
    fn on_session_started(&self);

    fn on_session_rejected(&self, reason: TerminationReason);

    fn on_session_aborted(&self, reason: TerminationReason);

    fn on_transfer_progress(&self, current: u64, total: u64);

    fn on_content_transferred(&self, content: &ContentDescriptor);

    fn on_sharing_error(&self, error: &ContentSharingError);
}

/// Listener for HTTP file transfer sessions
pub trait FileTransferListener: Send + Sync {
    /// Incoming invitation presented for a manual answer
    fn on_session_invited(
        &self,
        content: &ContentDescriptor,
        file_expiration: DateTime<Utc>,
        icon_expiration: Option<DateTime<Utc>>,
    );

    /// Incoming invitation accepted by policy, no user interaction
    fn on_session_auto_accepted(
        &self,
        content: &ContentDescriptor,
        file_expiration: DateTime<Utc>,
        icon_expiration: Option<DateTime<Utc>>,
    );

    fn on_session_accepted(&self);

    fn on_session_rejected(&self, reason: TerminationReason);

    fn on_session_aborted(&self, reason: TerminationReason);

    fn on_transfer_progress(&self, current: u64, total: u64);

    fn on_file_transferred(
        &self,
        content: &ContentDescriptor,
        file_expiration: DateTime<Utc>,
        icon_expiration: Option<DateTime<Utc>>,
    );

    fn on_transfer_paused(&self, reason: PauseReason);

    fn on_transfer_resumed(&self);

    fn on_transfer_error(&self, error: &FileSharingError);
}
