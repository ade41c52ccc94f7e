//! Sharing-session state machine types
//!
//! States, answers and termination reasons shared by the SIP-signalled
//! content sharing sessions (image and video).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Answer to a pending invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationAnswer {
    Accepted,
    /// User declined
    RejectedDecline,
    /// User busy
    RejectedBusy,
    /// Rejected by a layer the system controls (capacity, policy)
    RejectedBySystem,
    /// Remote side cancelled the invitation
    Canceled,
    /// Nobody answered before the deadline
    Timeout,
}

/// Why a session ended without transferring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    ByUser,
    ByTimeout,
    ByRemote,
    BySystem,
}

/// Content sharing session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharingState {
    /// Outgoing session, INVITE not yet sent
    Initiating,
    /// Incoming session, waiting for a local answer
    Invited,
    /// 180 Ringing sent or received
    Ringing,
    /// Local user accepted, signalling in progress
    Accepting,
    /// 200 OK and ACK exchanged
    Established,
    /// Media is flowing
    Started,
    /// Content fully transferred
    Transferred,
    /// Ended on local or remote request
    Aborted,
    /// Ended on error
    Failed,
    /// Invitation rejected before establishment
    Rejected,
}

impl SharingState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &SharingState) -> bool {
        use SharingState::*;

        match (self, new_state) {
            // From Initiating (outgoing)
            (Initiating, Ringing) => true,
            (Initiating, Established) => true,
            (Initiating, Rejected) | (Initiating, Aborted) | (Initiating, Failed) => true,

            // From Invited (incoming)
            (Invited, Ringing) => true,
            (Invited, Accepting) => true,
            (Invited, Rejected) | (Invited, Aborted) | (Invited, Failed) => true,

            // From Ringing
            (Ringing, Accepting) => true,
            (Ringing, Established) => true,
            (Ringing, Rejected) | (Ringing, Aborted) | (Ringing, Failed) => true,

            // From Accepting
            (Accepting, Established) => true,
            (Accepting, Rejected) | (Accepting, Aborted) | (Accepting, Failed) => true,

            // From Established
            (Established, Started) => true,
            (Established, Aborted) | (Established, Failed) => true,

            // From Started
            (Started, Transferred) => true,
            (Started, Aborted) | (Started, Failed) => true,

            _ => false,
        }
    }

    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SharingState::Transferred
                | SharingState::Aborted
                | SharingState::Failed
                | SharingState::Rejected
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            SharingState::Initiating => "Initiating",
            SharingState::Invited => "Invited",
            SharingState::Ringing => "Ringing",
            SharingState::Accepting => "Accepting",
            SharingState::Established => "Established",
            SharingState::Started => "Started",
            SharingState::Transferred => "Transferred",
            SharingState::Aborted => "Aborted",
            SharingState::Failed => "Failed",
            SharingState::Rejected => "Rejected",
        }
    }
}

/// Reason code surfaced to the application layer together with a state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    Unspecified,
    RejectedByUser,
    RejectedByTimeout,
    RejectedByRemote,
    RejectedBySystem,
    UnsupportedMediaType,
    InitiationFailed,
    MediaFailed,
    MediaNotInitialized,
}

/// Content sharing errors
#[derive(Error, Debug, Clone)]
pub enum ContentSharingError {
    #[error("Unsupported media type")]
    UnsupportedMediaType,

    #[error("Session initiation failed: {0}")]
    SessionInitiationFailed(String),

    #[error("Session initiation declined")]
    SessionInitiationDeclined,

    #[error("Session initiation cancelled")]
    SessionInitiationCancelled,

    #[error("Media transfer failed: {0}")]
    MediaTransferFailed(String),

    #[error("Media renderer not initialized")]
    MediaRendererNotInitialized,

    #[error("Unexpected error: {0}")]
    UnexpectedException(String),
}

impl ContentSharingError {
    /// Terminal state and reason code for this error.
    ///
    /// The mapping is total on purpose: every error translates to exactly
    /// one (state, reason) pair.
    pub fn reason(&self) -> (SharingState, ReasonCode) {
        match self {
            ContentSharingError::UnsupportedMediaType => {
                (SharingState::Failed, ReasonCode::UnsupportedMediaType)
            }
            ContentSharingError::SessionInitiationFailed(_) => {
                (SharingState::Failed, ReasonCode::InitiationFailed)
            }
            ContentSharingError::SessionInitiationDeclined => {
                (SharingState::Rejected, ReasonCode::RejectedByUser)
            }
            ContentSharingError::SessionInitiationCancelled => {
                (SharingState::Rejected, ReasonCode::RejectedByRemote)
            }
            ContentSharingError::MediaTransferFailed(_) => {
                (SharingState::Failed, ReasonCode::MediaFailed)
            }
            ContentSharingError::MediaRendererNotInitialized => {
                (SharingState::Failed, ReasonCode::MediaNotInitialized)
            }
            ContentSharingError::UnexpectedException(_) => {
                (SharingState::Failed, ReasonCode::Unspecified)
            }
        }
    }
}

impl TerminationReason {
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            TerminationReason::ByUser => ReasonCode::RejectedByUser,
            TerminationReason::ByTimeout => ReasonCode::RejectedByTimeout,
            TerminationReason::ByRemote => ReasonCode::RejectedByRemote,
            TerminationReason::BySystem => ReasonCode::RejectedBySystem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminating_session_path() {
        let path = [
            SharingState::Invited,
            SharingState::Ringing,
            SharingState::Accepting,
            SharingState::Established,
            SharingState::Started,
            SharingState::Transferred,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(&pair[1]),
                "{} -> {} should be allowed",
                pair[0].name(),
                pair[1].name()
            );
        }
    }

    #[test]
    fn test_terminal_states_are_sinks() {
        let terminals = [
            SharingState::Transferred,
            SharingState::Aborted,
            SharingState::Failed,
            SharingState::Rejected,
        ];
        let all = [
            SharingState::Initiating,
            SharingState::Invited,
            SharingState::Ringing,
            SharingState::Accepting,
            SharingState::Established,
            SharingState::Started,
            SharingState::Transferred,
            SharingState::Aborted,
            SharingState::Failed,
            SharingState::Rejected,
        ];
        for terminal in &terminals {
            assert!(terminal.is_terminal());
            for target in &all {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_cannot_skip_establishment() {
        assert!(!SharingState::Invited.can_transition_to(&SharingState::Started));
        assert!(!SharingState::Ringing.can_transition_to(&SharingState::Transferred));
    }

    #[test]
    fn test_error_reason_mapping_is_total() {
        let errors = [
            ContentSharingError::UnsupportedMediaType,
            ContentSharingError::SessionInitiationFailed("x".into()),
            ContentSharingError::SessionInitiationDeclined,
            ContentSharingError::SessionInitiationCancelled,
            ContentSharingError::MediaTransferFailed("x".into()),
            ContentSharingError::MediaRendererNotInitialized,
            ContentSharingError::UnexpectedException("x".into()),
        ];
        for error in &errors {
            let (state, _) = error.reason();
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn test_unsupported_media_maps_to_failed() {
        let (state, reason) = ContentSharingError::UnsupportedMediaType.reason();
        assert_eq!(state, SharingState::Failed);
        assert_eq!(reason, ReasonCode::UnsupportedMediaType);
    }
}
