//! Contact capability store
//!
//! Port for the per-contact capability cache. Mutations for a single
//! contact are serialized by the store; different contacts may be updated
//! concurrently.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::capability::{Capabilities, ContactInfo, RcsStatus, RegistrationState};
use crate::domain::shared::value_objects::ContactId;

#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Record the time a capability probe was sent for this contact
    async fn update_capabilities_time_last_request(&self, contact: &ContactId);

    /// Record the time a capability response arrived for this contact
    async fn update_capabilities_time_last_response(&self, contact: &ContactId);

    /// Overwrite the cached capability record
    async fn set_contact_capabilities(
        &self,
        contact: &ContactId,
        capabilities: Capabilities,
        rcs_status: RcsStatus,
        registration_state: RegistrationState,
    );

    /// Current record; a contact never seen yields a NO_INFO record
    async fn get_contact_info(&self, contact: &ContactId) -> ContactInfo;
}

/// In-memory contact repository
#[derive(Default)]
pub struct InMemoryContactRepository {
    contacts: Mutex<HashMap<ContactId, ContactInfo>>,
}

impl InMemoryContactRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContactRepository for InMemoryContactRepository {
    async fn update_capabilities_time_last_request(&self, contact: &ContactId) {
        let mut contacts = self.contacts.lock().await;
        let info = contacts
            .entry(contact.clone())
            .or_insert_with(|| ContactInfo::no_info(contact.clone()));
        info.time_last_request = Some(Utc::now());
    }

    async fn update_capabilities_time_last_response(&self, contact: &ContactId) {
        let mut contacts = self.contacts.lock().await;
        let info = contacts
            .entry(contact.clone())
            .or_insert_with(|| ContactInfo::no_info(contact.clone()));
        info.time_last_response = Some(Utc::now());
    }

    async fn set_contact_capabilities(
        &self,
        contact: &ContactId,
        capabilities: Capabilities,
        rcs_status: RcsStatus,
        registration_state: RegistrationState,
    ) {
        debug!(
            "Set capabilities for {}: status={:?}, registration={:?}",
            contact, rcs_status, registration_state
        );
        let mut contacts = self.contacts.lock().await;
        let info = contacts
            .entry(contact.clone())
            .or_insert_with(|| ContactInfo::no_info(contact.clone()));
        info.capabilities = capabilities;
        info.rcs_status = rcs_status;
        info.registration_state = registration_state;
    }

    async fn get_contact_info(&self, contact: &ContactId) -> ContactInfo {
        let contacts = self.contacts.lock().await;
        contacts
            .get(contact)
            .cloned()
            .unwrap_or_else(|| ContactInfo::no_info(contact.clone()))
    }
}
