//! Capability discovery using the OPTIONS procedure
//!
//! Outbound probes run detached in a bounded pool; inbound probes are
//! answered synchronously with the local feature set.

pub mod options_task;

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::capability::{Capabilities, RcsStatus, RegistrationState};
use crate::domain::shared::value_objects::ContactId;
use crate::infrastructure::persistence::ContactRepository;
use crate::infrastructure::protocols::sip::factory;
use crate::infrastructure::protocols::sip::sdp::SdpSession;
use crate::infrastructure::protocols::sip::{
    ImsLink, SipError, SipRequest, SipTransport, UserCredentials,
};

use self::options_task::OptionsRequestTask;

#[derive(Error, Debug, Clone)]
pub enum CapabilityError {
    #[error("OPTIONS request failed: {0}")]
    OptionsFailed(String),
}

/// Application-side sink for capability discoveries
pub trait CapabilityListener: Send + Sync {
    fn on_capabilities_received(&self, contact: &ContactId, capabilities: &Capabilities);
}

/// Capability discovery manager using the options procedure
pub struct CapabilityService {
    transport: Arc<dyn SipTransport>,
    link: Arc<dyn ImsLink>,
    contacts: Arc<dyn ContactRepository>,
    listener: Arc<dyn CapabilityListener>,
    credentials: UserCredentials,
    local_party: String,
    domain: String,
    local_capabilities: Capabilities,
    max_workers: usize,
    pool: std::sync::Mutex<Option<Arc<Semaphore>>>,
}

impl CapabilityService {
    pub fn new(
        config: &Config,
        transport: Arc<dyn SipTransport>,
        link: Arc<dyn ImsLink>,
        contacts: Arc<dyn ContactRepository>,
        listener: Arc<dyn CapabilityListener>,
    ) -> Self {
        Self {
            transport,
            link,
            contacts,
            listener,
            credentials: UserCredentials {
                username: config.ims.private_id.clone(),
                password: config.ims.password.clone(),
            },
            local_party: config.ims.public_uri.clone(),
            domain: config.ims.domain.clone(),
            local_capabilities: Capabilities::local(
                config.capability.image_sharing,
                config.capability.video_sharing,
            ),
            max_workers: config.capability.max_probe_workers,
            pool: std::sync::Mutex::new(None),
        }
    }

    /// Start the manager
    pub fn start(&self) {
        let mut pool = self.pool.lock().unwrap();
        *pool = Some(Arc::new(Semaphore::new(self.max_workers)));
        info!(
            "Capability service started with {} probe workers",
            self.max_workers
        );
    }

    /// Stop the manager; in-flight probes are tolerated
    pub fn stop(&self) {
        let pool = self.pool.lock().unwrap().take();
        match pool {
            Some(pool) => {
                pool.close();
                info!("Capability service stopped");
            }
            None => warn!("Capability service was not started"),
        }
    }

    /// Request contact capabilities in the background
    pub fn request_capabilities(&self, contact: ContactId) {
        debug!("Request capabilities in background for {}", contact);

        let pool = match self.pool.lock().unwrap().clone() {
            Some(pool) => pool,
            None => {
                warn!("Capability service not started; probe for {} dropped", contact);
                return;
            }
        };

        let task = OptionsRequestTask::new(
            self.transport.clone(),
            self.link.clone(),
            self.contacts.clone(),
            self.listener.clone(),
            contact.clone(),
            self.local_capabilities.to_feature_tags(),
            self.credentials.clone(),
            self.local_party.clone(),
            self.domain.clone(),
        );

        tokio::spawn(async move {
            match pool.acquire_owned().await {
                Ok(_permit) => task.run().await,
                Err(_) => {
                    warn!("Capability pool closed; probe for {} dropped", contact);
                }
            }
        });
    }

    /// Request capabilities for a set of contacts; no ordering guarantee
    pub fn request_capabilities_for(&self, contacts: HashSet<ContactId>) {
        debug!("Request capabilities for {} contacts", contacts.len());
        for contact in contacts {
            self.request_capabilities(contact);
        }
    }

    /// Handle an inbound OPTIONS probe synchronously
    pub async fn receive_capability_request(&self, options: &SipRequest) -> Result<(), SipError> {
        let sip_id = options.asserted_identity().unwrap_or_default();
        let contact = match ContactId::parse(&sip_id) {
            Ok(contact) => contact,
            Err(_) => {
                warn!("Invalid contact from capability request '{}'", sip_id);
                return Ok(());
            }
        };
        debug!("OPTIONS request received from {}", contact);

        // Answer with the local feature set
        let sdp = SdpSession::create_capability_description("0.0.0.0").to_string();
        let response = factory::create_200_ok_options(
            options,
            &self.local_party,
            &self.local_capabilities.to_feature_tags(),
            &sdp,
        )?;
        self.transport.send_response(response).await?;

        // Read the feature tags of the requester
        let capabilities = Capabilities::from_feature_tags(&options.feature_tags());
        if capabilities.im_session {
            self.contacts
                .set_contact_capabilities(
                    &contact,
                    capabilities,
                    RcsStatus::RcsCapable,
                    RegistrationState::Online,
                )
                .await;
        } else {
            self.contacts
                .set_contact_capabilities(
                    &contact,
                    capabilities,
                    RcsStatus::NotRcs,
                    RegistrationState::Unknown,
                )
                .await;
        }

        self.listener
            .on_capabilities_received(&contact, &capabilities);
        Ok(())
    }
}
