//! Session machinery shared by the sharing and transfer workers

pub mod content_sharing;
pub mod file_transfer;
pub mod gate;
pub mod listener;
pub mod registry;

pub use content_sharing::{ImageSharingSession, VideoStreamingSession};
pub use file_transfer::HttpFileTransferSession;
pub use gate::InvitationGate;
pub use listener::{ContentSharingListener, FileTransferListener};
pub use registry::SessionRegistry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::domain::session::{Direction, TerminationReason};
use crate::domain::shared::value_objects::{ContactId, SessionId};

/// State shared by every session kind: identity, invitation gate, the
/// accepted latch and the terminal-transition claim.
pub struct SessionCore {
    session_id: SessionId,
    contact: ContactId,
    direction: Direction,
    gate: InvitationGate,
    accepted: AtomicBool,
    /// Set once by whichever path reaches a terminal state first
    terminal_claimed: AtomicBool,
    abort_reason: Mutex<Option<TerminationReason>>,
}

impl SessionCore {
    pub fn new(contact: ContactId, direction: Direction) -> Self {
        Self {
            session_id: SessionId::new(),
            contact,
            direction,
            gate: InvitationGate::new(),
            accepted: AtomicBool::new(false),
            terminal_claimed: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn contact(&self) -> &ContactId {
        &self.contact
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn gate(&self) -> &InvitationGate {
        &self.gate
    }

    /// Latch the local acceptance; returns false if already set
    pub fn set_accepted(&self) -> bool {
        !self.accepted.swap(true, Ordering::SeqCst)
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Claim the terminal transition.
    ///
    /// Returns true exactly once per session; every terminal path (natural
    /// completion, rejection, error, abort) must win this claim before
    /// notifying, which caps terminal notifications at one.
    pub fn claim_terminal(&self) -> bool {
        !self.terminal_claimed.swap(true, Ordering::SeqCst)
    }

    /// Whether some path already drove the session to a terminal state
    pub fn is_interrupted(&self) -> bool {
        self.terminal_claimed.load(Ordering::SeqCst)
    }

    /// Signal an asynchronous abort.
    ///
    /// Resolves the gate so a worker blocked on the invitation wakes up; a
    /// worker in a transfer loop observes the recorded reason at its next
    /// boundary. Returns true when the gate was still pending, meaning a
    /// worker will pick the signal up and emit the terminal notification.
    pub fn request_abort(&self, reason: TerminationReason) -> bool {
        *self.abort_reason.lock().unwrap() = Some(reason);
        self.gate
            .reject(crate::domain::session::InvitationAnswer::RejectedBySystem)
    }

    pub fn abort_requested(&self) -> Option<TerminationReason> {
        *self.abort_reason.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> SessionCore {
        SessionCore::new(
            ContactId::parse("+33612345678").unwrap(),
            Direction::Incoming,
        )
    }

    #[test]
    fn test_accepted_latch() {
        let core = core();
        assert!(!core.is_accepted());
        assert!(core.set_accepted());
        assert!(core.is_accepted());
        // Second acceptance attempt loses the latch
        assert!(!core.set_accepted());
    }

    #[test]
    fn test_terminal_claim_is_exclusive() {
        let core = core();
        assert!(!core.is_interrupted());
        assert!(core.claim_terminal());
        assert!(core.is_interrupted());
        assert!(!core.claim_terminal());
    }

    #[test]
    fn test_abort_resolves_gate() {
        let core = core();
        core.request_abort(TerminationReason::ByUser);
        assert_eq!(core.abort_requested(), Some(TerminationReason::ByUser));
        assert_eq!(
            core.gate().answer(),
            Some(crate::domain::session::InvitationAnswer::RejectedBySystem)
        );
    }
}
