//! Options request task
//!
//! One-shot background probe of a single contact's capabilities. Runs
//! detached in the capability pool; every failure is consumed here and
//! turned into record/log updates, never propagated.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::capability::{Capabilities, RcsStatus, RegistrationState};
use crate::domain::shared::value_objects::ContactId;
use crate::infrastructure::persistence::ContactRepository;
use crate::infrastructure::protocols::sip::factory;
use crate::infrastructure::protocols::sip::{
    generate_call_id, DialogPath, ImsLink, SessionAuthenticationAgent, SipError, SipTransport,
    TransactionContext, UserCredentials,
};

use super::{CapabilityError, CapabilityListener};

pub struct OptionsRequestTask {
    transport: Arc<dyn SipTransport>,
    link: Arc<dyn ImsLink>,
    contacts: Arc<dyn ContactRepository>,
    listener: Arc<dyn CapabilityListener>,
    contact: ContactId,
    feature_tags: Vec<String>,
    credentials: UserCredentials,
    local_party: String,
    domain: String,
}

impl OptionsRequestTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn SipTransport>,
        link: Arc<dyn ImsLink>,
        contacts: Arc<dyn ContactRepository>,
        listener: Arc<dyn CapabilityListener>,
        contact: ContactId,
        feature_tags: Vec<String>,
        credentials: UserCredentials,
        local_party: String,
        domain: String,
    ) -> Self {
        Self {
            transport,
            link,
            contacts,
            listener,
            contact,
            feature_tags,
            credentials,
            local_party,
            domain,
        }
    }

    /// Background processing
    pub async fn run(self) {
        self.send_options().await;
    }

    async fn send_options(&self) {
        info!("Send an OPTIONS message to {}", self.contact);

        if !self.link.is_registered() {
            debug!("IMS not registered, do nothing");
            return;
        }

        // Exactly one last-request update per probe actually sent
        self.contacts
            .update_capabilities_time_last_request(&self.contact)
            .await;

        let mut dialog = DialogPath::originating(
            generate_call_id(&self.domain),
            &self.local_party,
            self.contact.to_sip_uri(&self.domain),
        );

        if let Err(error) = self.transact(&mut dialog).await {
            self.handle_error(error).await;
        }
    }

    async fn transact(&self, dialog: &mut DialogPath) -> Result<(), CapabilityError> {
        debug!("Send first OPTIONS");
        let options = factory::create_options(dialog, &self.feature_tags)
            .map_err(CapabilityError::from)?;
        let mut ctx = self
            .transport
            .send_request_and_wait(options)
            .await
            .map_err(CapabilityError::from)?;

        // A 407 grants exactly one authenticated retry
        if ctx.is_sip_response() && ctx.status_code == 407 {
            info!("407 response received");
            let response = ctx.response.as_ref().ok_or_else(|| {
                CapabilityError::OptionsFailed("407 without response".to_string())
            })?;
            let mut agent = SessionAuthenticationAgent::new(self.credentials.clone());
            agent
                .read_proxy_authenticate(response)
                .map_err(CapabilityError::from)?;
            dialog.increment_cseq();

            info!("Send second OPTIONS");
            let mut options = factory::create_options(dialog, &self.feature_tags)
                .map_err(CapabilityError::from)?;
            let uri = dialog.target().to_string();
            agent
                .set_proxy_authorization(&mut options, "OPTIONS", &uri)
                .map_err(CapabilityError::from)?;
            ctx = self
                .transport
                .send_request_and_wait(options)
                .await
                .map_err(CapabilityError::from)?;
            if ctx.is_sip_response() && ctx.status_code == 407 {
                return Err(CapabilityError::OptionsFailed(
                    "challenged again after authentication".to_string(),
                ));
            }
        }

        self.handle_outcome(ctx).await
    }

    /// Route the final transaction outcome
    async fn handle_outcome(&self, ctx: TransactionContext) -> Result<(), CapabilityError> {
        if !ctx.is_sip_response() {
            debug!("No response received for OPTIONS");
            return Err(CapabilityError::OptionsFailed("no response".to_string()));
        }
        match ctx.status_code {
            200 => {
                self.handle_200_ok(&ctx).await;
                Ok(())
            }
            480 | 408 => {
                self.handle_user_not_registered().await;
                Ok(())
            }
            404 => {
                self.handle_user_not_found().await;
                Ok(())
            }
            code => Err(CapabilityError::OptionsFailed(format!(
                "{} {}",
                code, ctx.reason_phrase
            ))),
        }
    }

    /// 200 OK: extract capabilities and refresh the record
    async fn handle_200_ok(&self, ctx: &TransactionContext) {
        info!("200 OK response received for {}", self.contact);
        let response = match &ctx.response {
            Some(response) => response,
            None => return,
        };

        let capabilities = Capabilities::from_feature_tags(&response.feature_tags());
        self.contacts
            .update_capabilities_time_last_response(&self.contact)
            .await;

        if capabilities.im_session {
            // A response carrying the automata tag means the endpoint is a
            // machine, which counts as unregistered (RCS 5.1, 2.7.1.1)
            if capabilities.sip_automata {
                self.contacts
                    .set_contact_capabilities(
                        &self.contact,
                        capabilities,
                        RcsStatus::RcsCapable,
                        RegistrationState::Offline,
                    )
                    .await;
            } else {
                self.contacts
                    .set_contact_capabilities(
                        &self.contact,
                        capabilities,
                        RcsStatus::RcsCapable,
                        RegistrationState::Online,
                    )
                    .await;
            }
        } else {
            self.contacts
                .set_contact_capabilities(
                    &self.contact,
                    capabilities,
                    RcsStatus::NotRcs,
                    RegistrationState::Unknown,
                )
                .await;
        }

        self.listener
            .on_capabilities_received(&self.contact, &capabilities);
    }

    /// 480/408: the contact exists but is not registered
    async fn handle_user_not_registered(&self) {
        info!("User {} is not registered", self.contact);
        let info = self.contacts.get_contact_info(&self.contact).await;
        if info.rcs_status == RcsStatus::NoInfo {
            // Nothing known yet: record empty capabilities
            self.contacts
                .set_contact_capabilities(
                    &self.contact,
                    Capabilities::default(),
                    RcsStatus::NoInfo,
                    RegistrationState::Offline,
                )
                .await;
        } else {
            // Keep what we knew, only flip the registration state
            self.contacts
                .set_contact_capabilities(
                    &self.contact,
                    info.capabilities,
                    info.rcs_status,
                    RegistrationState::Offline,
                )
                .await;
            self.listener
                .on_capabilities_received(&self.contact, &info.capabilities);
        }
    }

    /// 404: the contact is not provisioned for RCS
    async fn handle_user_not_found(&self) {
        info!("User {} is not found", self.contact);
        let capabilities = Capabilities::default();
        self.contacts
            .set_contact_capabilities(
                &self.contact,
                capabilities,
                RcsStatus::NotRcs,
                RegistrationState::Unknown,
            )
            .await;
        self.listener
            .on_capabilities_received(&self.contact, &capabilities);
    }

    /// Transport faults and unexpected responses end here; the record keeps
    /// its last-request time and nothing else changes
    async fn handle_error(&self, error: CapabilityError) {
        warn!("Options has failed for contact {}: {}", self.contact, error);
    }
}

impl From<SipError> for CapabilityError {
    fn from(error: SipError) -> Self {
        CapabilityError::OptionsFailed(error.to_string())
    }
}
