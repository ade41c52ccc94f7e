//! Invitation rendezvous
//!
//! Blocks a session worker until the invitation is answered by the local
//! user (accept/reject), the remote side (cancel) or the clock (timeout).
//! Resolution happens exactly once; later attempts are no-ops.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use crate::domain::session::InvitationAnswer;

pub struct InvitationGate {
    answer: Mutex<Option<InvitationAnswer>>,
    notify: Notify,
}

impl InvitationGate {
    pub fn new() -> Self {
        Self {
            answer: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Resolve with an answer; returns false if already resolved
    fn resolve(&self, answer: InvitationAnswer) -> bool {
        let mut slot = self.answer.lock().unwrap();
        if slot.is_some() {
            return false;
        }
        *slot = Some(answer);
        drop(slot);
        self.notify.notify_waiters();
        true
    }

    pub fn accept(&self) -> bool {
        self.resolve(InvitationAnswer::Accepted)
    }

    /// Reject with one of the rejected/cancelled answers
    pub fn reject(&self, answer: InvitationAnswer) -> bool {
        debug_assert!(!matches!(answer, InvitationAnswer::Accepted));
        self.resolve(answer)
    }

    /// Remote side withdrew the invitation
    pub fn cancel(&self) -> bool {
        self.resolve(InvitationAnswer::Canceled)
    }

    /// Answer recorded so far, if any
    pub fn answer(&self) -> Option<InvitationAnswer> {
        *self.answer.lock().unwrap()
    }

    /// Wait until the gate resolves or `timeout` elapses.
    ///
    /// The timeout is a hard deadline computed once by the caller; on expiry
    /// the gate latches `Timeout` unless a racing resolution won, in which
    /// case the winner is returned.
    pub async fn wait_answer(&self, timeout: Duration) -> InvitationAnswer {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before the check so a resolution racing with
            // it cannot be missed
            notified.as_mut().enable();
            if let Some(answer) = self.answer() {
                return answer;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                self.resolve(InvitationAnswer::Timeout);
                // A resolution racing with the deadline may have won
                return self.answer().unwrap_or(InvitationAnswer::Timeout);
            }
        }
    }
}

impl Default for InvitationGate {
    fn default() -> Self {
        Self::new()
    }
}
