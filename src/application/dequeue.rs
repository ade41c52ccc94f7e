//! Queued message dequeue task
//!
//! Redispatches queued one-to-one messages. One bad message never blocks
//! the rest of the queue.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::ContactId;
use crate::infrastructure::persistence::{MessagingLog, QueuedMessage};

/// Observable state of a one-to-one chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSessionStatus {
    pub media_established: bool,
    pub initiated_by_remote: bool,
    pub accepted: bool,
}

/// Chat service seam used to redispatch queued messages
#[async_trait]
pub trait ChatDispatcher: Send + Sync {
    /// Status of the active session with this contact, if any
    async fn session_status(&self, contact: &ContactId) -> Option<ChatSessionStatus>;

    /// Send on the established session
    async fn send_within_session(&self, message: &QueuedMessage) -> Result<(), DomainError>;

    /// Accept the pending remote-initiated session
    async fn accept_session(&self, contact: &ContactId) -> Result<(), DomainError>;

    /// Open a new session carrying the message
    async fn send_in_new_session(&self, message: &QueuedMessage) -> Result<(), DomainError>;
}

pub struct DequeueTask {
    log: Arc<dyn MessagingLog>,
    dispatcher: Arc<dyn ChatDispatcher>,
}

impl DequeueTask {
    pub fn new(log: Arc<dyn MessagingLog>, dispatcher: Arc<dyn ChatDispatcher>) -> Self {
        Self { log, dispatcher }
    }

    /// Dequeue and dispatch all queued one-to-one messages
    pub async fn run(&self) {
        debug!("Execute task to dequeue one-to-one chat messages");
        let queued = self.log.get_queued_one_to_one_messages().await;
        for message in queued {
            if let Err(e) = self.dequeue_one(&message).await {
                // Log and keep going; the remaining messages must still be
                // dequeued
                error!(
                    "Failed to dequeue message '{}' for contact '{}': {}",
                    message.message_id, message.contact, e
                );
            }
        }
    }

    async fn dequeue_one(&self, message: &QueuedMessage) -> Result<(), DomainError> {
        match self.dispatcher.session_status(&message.contact).await {
            Some(status) if status.media_established => {
                self.dispatcher.send_within_session(message).await?;
                self.log.remove_queued_message(&message.message_id).await;
            }
            Some(status) if status.initiated_by_remote && !status.accepted => {
                // Accept the pending session; the message stays queued and
                // goes out once the session is established
                self.dispatcher.accept_session(&message.contact).await?;
            }
            _ => {
                self.dispatcher.send_in_new_session(message).await?;
                self.log.remove_queued_message(&message.message_id).await;
            }
        }
        Ok(())
    }
}
