//! Messaging and transfer log
//!
//! Port for the persisted side of messaging: queued one-to-one messages and
//! the resume records that let HTTP transfers survive a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::shared::value_objects::{ContactId, TransferId};
use crate::domain::transfer::FtHttpResume;

/// A one-to-one chat message waiting for dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub message_id: String,
    pub contact: ContactId,
    pub mime_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait MessagingLog: Send + Sync {
    /// Persist the download server address for a transfer
    async fn set_file_download_address(&self, transfer_id: &TransferId, address: &str);

    /// Persist the remote SIP instance identifier for a transfer
    async fn set_remote_sip_instance(&self, transfer_id: &TransferId, instance: &str);

    /// Create or replace a resume record
    async fn add_resume_entry(&self, entry: FtHttpResume);

    /// Update the acknowledged byte offset of a resume record
    async fn set_resume_offset(&self, transfer_id: &TransferId, offset: u64);

    async fn get_resume_entry(&self, transfer_id: &TransferId) -> Option<FtHttpResume>;

    /// Delete a resume record once the transfer is terminal
    async fn remove_resume_entry(&self, transfer_id: &TransferId);

    async fn queue_message(&self, message: QueuedMessage);

    /// All queued one-to-one messages, oldest first
    async fn get_queued_one_to_one_messages(&self) -> Vec<QueuedMessage>;

    async fn remove_queued_message(&self, message_id: &str);
}

/// In-memory messaging log
#[derive(Default)]
pub struct InMemoryMessagingLog {
    download_addresses: Mutex<HashMap<TransferId, String>>,
    sip_instances: Mutex<HashMap<TransferId, String>>,
    resume_entries: Mutex<HashMap<TransferId, FtHttpResume>>,
    queued: Mutex<Vec<QueuedMessage>>,
}

impl InMemoryMessagingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn download_address(&self, transfer_id: &TransferId) -> Option<String> {
        self.download_addresses.lock().await.get(transfer_id).cloned()
    }

    pub async fn remote_sip_instance(&self, transfer_id: &TransferId) -> Option<String> {
        self.sip_instances.lock().await.get(transfer_id).cloned()
    }
}

#[async_trait]
impl MessagingLog for InMemoryMessagingLog {
    async fn set_file_download_address(&self, transfer_id: &TransferId, address: &str) {
        self.download_addresses
            .lock()
            .await
            .insert(transfer_id.clone(), address.to_string());
    }

    async fn set_remote_sip_instance(&self, transfer_id: &TransferId, instance: &str) {
        self.sip_instances
            .lock()
            .await
            .insert(transfer_id.clone(), instance.to_string());
    }

    async fn add_resume_entry(&self, entry: FtHttpResume) {
        self.resume_entries
            .lock()
            .await
            .insert(entry.transfer_id.clone(), entry);
    }

    async fn set_resume_offset(&self, transfer_id: &TransferId, offset: u64) {
        if let Some(entry) = self.resume_entries.lock().await.get_mut(transfer_id) {
            entry.offset = offset;
        }
    }

    async fn get_resume_entry(&self, transfer_id: &TransferId) -> Option<FtHttpResume> {
        self.resume_entries.lock().await.get(transfer_id).cloned()
    }

    async fn remove_resume_entry(&self, transfer_id: &TransferId) {
        self.resume_entries.lock().await.remove(transfer_id);
    }

    async fn queue_message(&self, message: QueuedMessage) {
        self.queued.lock().await.push(message);
    }

    async fn get_queued_one_to_one_messages(&self) -> Vec<QueuedMessage> {
        self.queued.lock().await.clone()
    }

    async fn remove_queued_message(&self, message_id: &str) {
        self.queued
            .lock()
            .await
            .retain(|m| m.message_id != message_id);
    }
}
