//! Rich call service
//!
//! Owns the content sharing session registry, spawns one worker per session
//! and routes API and network events to live sessions by id.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{ContactId, ContentDescriptor, SessionId};
use crate::infrastructure::protocols::sip::{SipError, SipRequest, SipTransport, UserCredentials};

use super::session::content_sharing::{
    ContentStreamer, ImageSharingSession, SharingRegistry, SharingSession, VideoRenderer,
    VideoStreamingSession,
};
use super::session::ContentSharingListener;

pub struct RichcallService {
    registry: Arc<SharingRegistry>,
    transport: Arc<dyn SipTransport>,
    credentials: UserCredentials,
    local_party: String,
    domain: String,
    ringing_period: Duration,
}

impl RichcallService {
    pub fn new(config: &Config, transport: Arc<dyn SipTransport>) -> Self {
        Self {
            registry: Arc::new(SharingRegistry::new()),
            transport,
            credentials: UserCredentials {
                username: config.ims.private_id.clone(),
                password: config.ims.password.clone(),
            },
            local_party: config.ims.public_uri.clone(),
            domain: config.ims.domain.clone(),
            ringing_period: Duration::from_secs(config.ims.ringing_period),
        }
    }

    pub fn registry(&self) -> Arc<SharingRegistry> {
        self.registry.clone()
    }

    /// Resolve a live session; callers must not cache the result across
    /// suspension points
    pub async fn session(&self, id: &SessionId) -> Option<Arc<SharingSession>> {
        self.registry.get(id).await
    }

    async fn register(&self, session: SharingSession) -> Result<SessionId, DomainError> {
        let id = session.session_id();
        self.registry.add(id, Arc::new(session)).await?;
        Ok(id)
    }

    /// Handle an inbound video sharing INVITE
    pub async fn receive_video_sharing_invite(
        &self,
        invite: SipRequest,
        content: ContentDescriptor,
        renderer: Arc<dyn VideoRenderer>,
        listener: Arc<dyn ContentSharingListener>,
    ) -> Result<SessionId, DomainError> {
        let contact = contact_from_invite(&invite)?;
        info!("Receive video sharing invitation from {}", contact);
        let session = Arc::new(
            VideoStreamingSession::incoming(
                invite,
                contact,
                content,
                &self.local_party,
                renderer,
                self.transport.clone(),
                self.registry.clone(),
                self.credentials.clone(),
                self.ringing_period,
            )
            .map_err(sip_to_domain)?,
        );
        session.add_listener(listener);
        let id = self
            .register(SharingSession::Video(session.clone()))
            .await?;
        tokio::spawn(session.run_terminating());
        Ok(id)
    }

    /// Handle an inbound image sharing INVITE
    pub async fn receive_image_sharing_invite(
        &self,
        invite: SipRequest,
        content: ContentDescriptor,
        streamer: Arc<dyn ContentStreamer>,
        listener: Arc<dyn ContentSharingListener>,
    ) -> Result<SessionId, DomainError> {
        let contact = contact_from_invite(&invite)?;
        info!("Receive image sharing invitation from {}", contact);
        let session = Arc::new(
            ImageSharingSession::incoming(
                invite,
                contact,
                content,
                &self.local_party,
                streamer,
                self.transport.clone(),
                self.registry.clone(),
                self.credentials.clone(),
                self.ringing_period,
            )
            .map_err(sip_to_domain)?,
        );
        session.add_listener(listener);
        let id = self
            .register(SharingSession::Image(session.clone()))
            .await?;
        tokio::spawn(session.run_terminating());
        Ok(id)
    }

    /// Start an outgoing image share
    pub async fn initiate_image_sharing(
        &self,
        contact: ContactId,
        content: ContentDescriptor,
        streamer: Arc<dyn ContentStreamer>,
        listener: Arc<dyn ContentSharingListener>,
    ) -> Result<SessionId, DomainError> {
        info!("Initiate image sharing with {}", contact);
        let session = Arc::new(ImageSharingSession::outgoing(
            contact,
            content,
            &self.local_party,
            &self.domain,
            streamer,
            self.transport.clone(),
            self.registry.clone(),
            self.credentials.clone(),
            self.ringing_period,
        ));
        session.add_listener(listener);
        let id = self
            .register(SharingSession::Image(session.clone()))
            .await?;
        tokio::spawn(session.run_originating());
        Ok(id)
    }

    /// Start an outgoing video share
    pub async fn initiate_video_sharing(
        &self,
        contact: ContactId,
        content: ContentDescriptor,
        renderer: Arc<dyn VideoRenderer>,
        listener: Arc<dyn ContentSharingListener>,
    ) -> Result<SessionId, DomainError> {
        info!("Initiate video sharing with {}", contact);
        let session = Arc::new(VideoStreamingSession::outgoing(
            contact,
            content,
            &self.local_party,
            &self.domain,
            renderer,
            self.transport.clone(),
            self.registry.clone(),
            self.credentials.clone(),
            self.ringing_period,
        ));
        session.add_listener(listener);
        let id = self
            .register(SharingSession::Video(session.clone()))
            .await?;
        tokio::spawn(session.run_originating());
        Ok(id)
    }

    pub async fn accept_invitation(&self, id: &SessionId) -> Result<(), DomainError> {
        self.resolve(id).await?.accept_invitation()
    }

    pub async fn reject_invitation(&self, id: &SessionId) -> Result<(), DomainError> {
        self.resolve(id).await?.reject_invitation().await
    }

    pub async fn abort_session(&self, id: &SessionId) -> Result<(), DomainError> {
        self.resolve(id).await?.abort_session().await
    }

    /// Network-thread hand-off for a remote CANCEL
    pub async fn receive_cancel(&self, id: &SessionId) {
        match self.registry.get(id).await {
            Some(session) => session.receive_cancel(),
            None => warn!("CANCEL for unknown session {}", id),
        }
    }

    /// Network-thread hand-off for a remote BYE
    pub async fn receive_bye(&self, id: &SessionId) {
        match self.registry.get(id).await {
            Some(session) => session.receive_bye().await,
            None => warn!("BYE for unknown session {}", id),
        }
    }

    async fn resolve(&self, id: &SessionId) -> Result<Arc<SharingSession>, DomainError> {
        self.registry
            .get(id)
            .await
            .ok_or_else(|| DomainError::NotFound(format!("session {}", id)))
    }
}

fn contact_from_invite(invite: &SipRequest) -> Result<ContactId, DomainError> {
    let identity = invite.asserted_identity().unwrap_or_default();
    ContactId::parse(&identity)
        .map_err(|e| DomainError::ValidationError(format!("Invalid remote identity: {}", e)))
}

fn sip_to_domain(error: SipError) -> DomainError {
    DomainError::ValidationError(error.to_string())
}
