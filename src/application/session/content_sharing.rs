//! SIP-signalled content sharing sessions (image and video)
//!
//! Each session owns one dialog path and is driven to completion by a single
//! worker task. Listener callbacks fire from that worker, in transition
//! order, and every session delivers exactly one terminal notification.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::domain::session::{
    ContentSharingError, Direction, InvitationAnswer, SharingState, TerminationReason,
};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{ContactId, ContentDescriptor, SessionId};
use crate::infrastructure::protocols::sip::codec::{
    extract_video_codecs, negotiate_video_codec, VideoCodec,
};
use crate::infrastructure::protocols::sip::factory;
use crate::infrastructure::protocols::sip::sdp::{SdpDirection, SdpSession};
use crate::infrastructure::protocols::sip::{
    DialogPath, SessionAuthenticationAgent, SipError, SipTransport, TransactionContext,
    UserCredentials,
};

use super::listener::ContentSharingListener;
use super::registry::SessionRegistry;
use super::SessionCore;

use async_trait::async_trait;

/// Renderer/producer collaborator for live video sessions
pub trait VideoRenderer: Send + Sync {
    fn supported_codecs(&self) -> Vec<VideoCodec>;

    /// Point the renderer at the negotiated remote endpoint
    fn set_remote_info(&self, codec: &VideoCodec, remote_host: &str, remote_port: u16);

    fn start(&self);

    fn stop(&self);
}

/// Byte mover collaborator for stored-content sessions (image over MSRP)
#[async_trait]
pub trait ContentStreamer: Send + Sync {
    /// Move the content, reporting (current, total) progress along the way
    async fn stream(
        &self,
        content: &ContentDescriptor,
        progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> Result<(), String>;

    /// Ask a running stream to stop at the next boundary
    fn abort(&self);
}

/// Registry entry covering both sharing session kinds
pub enum SharingSession {
    Image(Arc<ImageSharingSession>),
    Video(Arc<VideoStreamingSession>),
}

impl SharingSession {
    pub fn session_id(&self) -> SessionId {
        match self {
            SharingSession::Image(s) => s.session_id(),
            SharingSession::Video(s) => s.session_id(),
        }
    }

    pub fn contact(&self) -> ContactId {
        match self {
            SharingSession::Image(s) => s.ctx.core.contact().clone(),
            SharingSession::Video(s) => s.ctx.core.contact().clone(),
        }
    }

    pub fn accept_invitation(&self) -> Result<(), DomainError> {
        match self {
            SharingSession::Image(s) => s.accept_invitation(),
            SharingSession::Video(s) => s.accept_invitation(),
        }
    }

    pub async fn reject_invitation(&self) -> Result<(), DomainError> {
        match self {
            SharingSession::Image(s) => s.reject_invitation().await,
            SharingSession::Video(s) => s.reject_invitation().await,
        }
    }

    pub async fn abort_session(&self) -> Result<(), DomainError> {
        match self {
            SharingSession::Image(s) => s.abort_session().await,
            SharingSession::Video(s) => s.abort_session().await,
        }
    }

    pub fn receive_cancel(&self) {
        match self {
            SharingSession::Image(s) => s.ctx.receive_cancel(),
            SharingSession::Video(s) => s.ctx.receive_cancel(),
        }
    }

    pub async fn receive_bye(&self) {
        match self {
            SharingSession::Image(s) => s.receive_bye().await,
            SharingSession::Video(s) => s.receive_bye().await,
        }
    }
}

pub type SharingRegistry = SessionRegistry<SharingSession>;

/// State shared by both sharing session kinds
struct SharingCtx {
    core: SessionCore,
    content: ContentDescriptor,
    dialog: AsyncMutex<DialogPath>,
    state: std::sync::Mutex<SharingState>,
    listeners: std::sync::Mutex<Vec<Arc<dyn ContentSharingListener>>>,
    transport: Arc<dyn SipTransport>,
    registry: Arc<SharingRegistry>,
    credentials: UserCredentials,
    ringing_period: Duration,
}

impl SharingCtx {
    fn new(
        contact: ContactId,
        direction: Direction,
        content: ContentDescriptor,
        dialog: DialogPath,
        initial_state: SharingState,
        transport: Arc<dyn SipTransport>,
        registry: Arc<SharingRegistry>,
        credentials: UserCredentials,
        ringing_period: Duration,
    ) -> Self {
        Self {
            core: SessionCore::new(contact, direction),
            content,
            dialog: AsyncMutex::new(dialog),
            state: std::sync::Mutex::new(initial_state),
            listeners: std::sync::Mutex::new(Vec::new()),
            transport,
            registry,
            credentials,
            ringing_period,
        }
    }

    fn state(&self) -> SharingState {
        *self.state.lock().unwrap()
    }

    /// Transition with the state-machine guard
    fn set_state(&self, new_state: SharingState) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        if !state.can_transition_to(&new_state) {
            return Err(DomainError::InvalidStateTransition(format!(
                "{} -> {}",
                state.name(),
                new_state.name()
            )));
        }
        debug!(
            "Session {}: {} -> {}",
            self.core.session_id(),
            state.name(),
            new_state.name()
        );
        *state = new_state;
        Ok(())
    }

    /// Transition to a terminal state, tolerating an already-terminal guard
    fn set_terminal_state(&self, new_state: SharingState) {
        if let Err(e) = self.set_state(new_state) {
            debug!("Terminal transition suppressed: {}", e);
        }
    }

    fn add_listener(&self, listener: Arc<dyn ContentSharingListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn notify(&self, f: impl Fn(&dyn ContentSharingListener)) {
        let listeners: Vec<_> = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            f(listener.as_ref());
        }
    }

    /// Network-thread hand-off for a remote CANCEL
    fn receive_cancel(&self) {
        self.core.gate().cancel();
    }

    /// Send an INVITE, retrying once through a 407 challenge
    async fn send_invite_with_auth(
        &self,
        feature_tags: &[String],
        sdp: &str,
    ) -> Result<TransactionContext, SipError> {
        let mut agent = SessionAuthenticationAgent::new(self.credentials.clone());

        let invite = {
            let dialog = self.dialog.lock().await;
            factory::create_invite(&dialog, feature_tags, sdp)?
        };
        let ctx = self.transport.send_request_and_wait(invite).await?;
        if ctx.status_code != 407 {
            return Ok(ctx);
        }

        let response = ctx
            .response
            .as_ref()
            .ok_or_else(|| SipError::Authentication("407 without response body".to_string()))?;
        agent.read_proxy_authenticate(response)?;

        let retry = {
            let mut dialog = self.dialog.lock().await;
            dialog.increment_cseq();
            let mut retry = factory::create_invite(&dialog, feature_tags, sdp)?;
            let uri = dialog.target().to_string();
            agent.set_proxy_authorization(&mut retry, "INVITE", &uri)?;
            retry
        };
        self.transport.send_request_and_wait(retry).await
    }
}

/// Live video sharing session
pub struct VideoStreamingSession {
    ctx: SharingCtx,
    renderer: Arc<dyn VideoRenderer>,
    feature_tags: Vec<String>,
}

impl VideoStreamingSession {
    /// Session for a received INVITE
    pub fn incoming(
        invite: crate::infrastructure::protocols::sip::SipRequest,
        contact: ContactId,
        content: ContentDescriptor,
        local_party: &str,
        renderer: Arc<dyn VideoRenderer>,
        transport: Arc<dyn SipTransport>,
        registry: Arc<SharingRegistry>,
        credentials: UserCredentials,
        ringing_period: Duration,
    ) -> Result<Self, SipError> {
        let dialog = DialogPath::terminating(invite, local_party)?;
        Ok(Self {
            ctx: SharingCtx::new(
                contact,
                Direction::Incoming,
                content,
                dialog,
                SharingState::Invited,
                transport,
                registry,
                credentials,
                ringing_period,
            ),
            renderer,
            feature_tags: vec![crate::domain::capability::FEATURE_TAG_VIDEO_SHARE.to_string()],
        })
    }

    /// Session for a locally initiated share
    pub fn outgoing(
        contact: ContactId,
        content: ContentDescriptor,
        local_party: &str,
        local_host: &str,
        renderer: Arc<dyn VideoRenderer>,
        transport: Arc<dyn SipTransport>,
        registry: Arc<SharingRegistry>,
        credentials: UserCredentials,
        ringing_period: Duration,
    ) -> Self {
        let dialog = DialogPath::originating(
            crate::infrastructure::protocols::sip::generate_call_id(local_host),
            local_party,
            contact.to_sip_uri(local_host),
        );
        Self {
            ctx: SharingCtx::new(
                contact,
                Direction::Outgoing,
                content,
                dialog,
                SharingState::Initiating,
                transport,
                registry,
                credentials,
                ringing_period,
            ),
            renderer,
            feature_tags: vec![crate::domain::capability::FEATURE_TAG_VIDEO_SHARE.to_string()],
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.ctx.core.session_id()
    }

    pub fn state(&self) -> SharingState {
        self.ctx.state()
    }

    pub fn content(&self) -> &ContentDescriptor {
        &self.ctx.content
    }

    pub fn add_listener(&self, listener: Arc<dyn ContentSharingListener>) {
        self.ctx.add_listener(listener);
    }

    /// Accept a pending invitation
    pub fn accept_invitation(&self) -> Result<(), DomainError> {
        if !self.ctx.core.gate().accept() {
            return Err(DomainError::PermissionDenied(
                "Invitation already answered".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject a pending invitation; sends 603 Decline
    pub async fn reject_invitation(&self) -> Result<(), DomainError> {
        if !self.ctx.core.gate().reject(InvitationAnswer::RejectedDecline) {
            return Err(DomainError::PermissionDenied(
                "Invitation already answered".to_string(),
            ));
        }
        let response = {
            let dialog = self.ctx.dialog.lock().await;
            dialog
                .invite()
                .map(|invite| factory::create_603_decline(invite, dialog.local_tag()))
        };
        if let Some(Ok(response)) = response {
            if let Err(e) = self.ctx.transport.send_response(response).await {
                warn!("Failed to send 603 Decline: {}", e);
            }
        }
        Ok(())
    }

    /// Abort the session; asynchronous, the terminal notification follows
    pub async fn abort_session(&self) -> Result<(), DomainError> {
        if self.ctx.core.is_interrupted() {
            return Err(DomainError::InvalidOperation(
                "Session already terminated".to_string(),
            ));
        }
        let signalled_worker = self.ctx.core.request_abort(TerminationReason::ByUser);
        if !signalled_worker || self.ctx.core.direction() == Direction::Outgoing {
            // No worker is parked on the invitation gate (originating
            // sessions never wait on it); drive the termination from here
            self.terminate(TerminationReason::ByUser).await;
        }
        Ok(())
    }

    /// Remote BYE on an established session
    pub async fn receive_bye(&self) {
        self.terminate_inner(TerminationReason::ByRemote, false).await;
    }

    async fn terminate(&self, reason: TerminationReason) {
        self.terminate_inner(reason, true).await;
    }

    async fn terminate_inner(&self, reason: TerminationReason, send_signal: bool) {
        if !self.ctx.core.claim_terminal() {
            return;
        }
        let signal = {
            let mut dialog = self.ctx.dialog.lock().await;
            let signal = if send_signal && !dialog.is_terminated() {
                if dialog.is_session_established() {
                    factory::create_bye(&mut dialog).ok()
                } else if self.ctx.core.direction() == Direction::Outgoing
                    && !dialog.is_sig_established()
                {
                    factory::create_cancel(&dialog).ok()
                } else {
                    None
                }
            } else {
                None
            };
            dialog.terminate();
            signal
        };
        if let Some(signal) = signal {
            if let Err(e) = self.ctx.transport.send_request_and_wait(signal).await {
                warn!("Dialog teardown failed for session {}: {}", self.session_id(), e);
            }
        }
        self.renderer.stop();
        self.ctx.set_terminal_state(SharingState::Aborted);
        self.ctx.registry.remove(&self.session_id()).await;
        self.ctx.notify(|l| l.on_session_aborted(reason));
    }

    /// Background processing for the terminating side
    pub async fn run_terminating(self: Arc<Self>) {
        info!(
            "Initiate video sharing session {} as terminating",
            self.session_id()
        );
        if let Err(e) = self.clone().run_terminating_inner().await {
            self.handle_error(ContentSharingError::UnexpectedException(e.to_string()))
                .await;
        }
    }

    async fn run_terminating_inner(self: Arc<Self>) -> Result<(), SipError> {
        // Send 180 Ringing
        let ringing = {
            let dialog = self.ctx.dialog.lock().await;
            let invite = dialog
                .invite()
                .ok_or_else(|| SipError::InvalidMessage("No INVITE on dialog".to_string()))?;
            factory::create_180_ringing(invite, dialog.local_tag())?
        };
        self.ctx.transport.send_response(ringing).await?;
        let _ = self.ctx.set_state(SharingState::Ringing);

        // Parse the remote SDP part
        let remote_sdp = {
            let dialog = self.ctx.dialog.lock().await;
            dialog.remote_content().map(str::to_string)
        };
        let Some(remote_sdp) = remote_sdp.and_then(|raw| SdpSession::parse(&raw)) else {
            self.handle_error(ContentSharingError::SessionInitiationFailed(
                "Unparseable SDP offer".to_string(),
            ))
            .await;
            return Ok(());
        };
        let Some(video_media) = remote_sdp.media_description("video").cloned() else {
            self.send_415().await;
            self.handle_error(ContentSharingError::UnsupportedMediaType).await;
            return Ok(());
        };
        let proposed = extract_video_codecs(&video_media);
        let remote_host = remote_sdp.connection.address.clone();
        let remote_port = video_media.port;

        // Notify listeners
        self.ctx.notify(|l| l.on_session_invited(&self.ctx.content));

        // Wait invitation answer
        let answer = self.ctx.core.gate().wait_answer(self.ctx.ringing_period).await;
        match answer {
            InvitationAnswer::RejectedDecline | InvitationAnswer::RejectedBusy => {
                debug!("Session {} rejected by user", self.session_id());
                self.reject_terminal(TerminationReason::ByUser, false).await;
                return Ok(());
            }
            InvitationAnswer::Timeout => {
                debug!("Session {} rejected on timeout", self.session_id());
                self.reject_terminal(TerminationReason::ByTimeout, true).await;
                return Ok(());
            }
            InvitationAnswer::Canceled => {
                debug!("Session {} rejected by remote", self.session_id());
                self.reject_terminal(TerminationReason::ByRemote, false).await;
                return Ok(());
            }
            InvitationAnswer::RejectedBySystem => {
                if let Some(reason) = self.ctx.core.abort_requested() {
                    self.terminate(reason).await;
                } else if self.ctx.core.claim_terminal() {
                    // Rejection already surfaced by the controlling layer
                    self.ctx.set_terminal_state(SharingState::Rejected);
                    self.ctx.registry.remove(&self.session_id()).await;
                }
                return Ok(());
            }
            InvitationAnswer::Accepted => {
                self.ctx.core.set_accepted();
                let _ = self.ctx.set_state(SharingState::Accepting);
                self.ctx.notify(|l| l.on_session_accepted());
            }
        }

        // Codec negotiation
        let supported = self.renderer.supported_codecs();
        let Some(codec) = negotiate_video_codec(&supported, &proposed) else {
            debug!("Proposed codecs are not supported");
            self.send_415().await;
            self.handle_error(ContentSharingError::UnsupportedMediaType).await;
            return Ok(());
        };

        // Build the SDP answer
        let answer_sdp = SdpSession::create_video_answer(
            "0.0.0.0",
            video_media.port,
            codec.payload_type,
            &codec.encoding(),
            SdpDirection::RecvOnly,
        )
        .to_string();

        // An abort may have landed while negotiating
        if self.ctx.core.is_interrupted() {
            debug!("Session {} interrupted: end of processing", self.session_id());
            return Ok(());
        }

        // Send 200 OK and wait for the ACK
        let (ok_response, session_expires) = {
            let mut dialog = self.ctx.dialog.lock().await;
            dialog.set_local_content(answer_sdp.clone());
            let response =
                factory::create_200_ok_invite(&dialog, &self.feature_tags, &answer_sdp)?;
            dialog.sig_established();
            let expires = dialog
                .invite()
                .and_then(|i| i.header_value("Session-Expires"))
                .and_then(|v| v.split(';').next().unwrap_or("").trim().parse::<u64>().ok());
            (response, expires)
        };
        let ctx = self
            .ctx
            .transport
            .send_response_and_wait_ack(ok_response)
            .await?;

        if ctx.is_sip_ack() {
            info!("ACK received for session {}", self.session_id());
            {
                let mut dialog = self.ctx.dialog.lock().await;
                dialog.session_established();
            }
            let _ = self.ctx.set_state(SharingState::Established);

            if let Some(expires) = session_expires {
                Self::start_session_timer(&self, Duration::from_secs(expires));
            }

            self.renderer.set_remote_info(&codec, &remote_host, remote_port);
            self.renderer.start();
            let _ = self.ctx.set_state(SharingState::Started);
            self.ctx.notify(|l| l.on_session_started());
        } else {
            debug!("No ACK received for INVITE");
            self.handle_error(ContentSharingError::SessionInitiationFailed(
                "No ACK received".to_string(),
            ))
            .await;
        }
        Ok(())
    }

    /// Background processing for the originating side
    pub async fn run_originating(self: Arc<Self>) {
        info!(
            "Initiate video sharing session {} as originating",
            self.session_id()
        );
        if let Err(e) = self.clone().run_originating_inner().await {
            self.handle_error(ContentSharingError::UnexpectedException(e.to_string()))
                .await;
        }
    }

    async fn run_originating_inner(self: Arc<Self>) -> Result<(), SipError> {
        let offer = SdpSession::create_video_answer(
            "0.0.0.0",
            5070,
            96,
            "H264/90000",
            SdpDirection::SendOnly,
        )
        .to_string();
        {
            let mut dialog = self.ctx.dialog.lock().await;
            dialog.set_local_content(offer.clone());
        }

        let ctx = self
            .ctx
            .send_invite_with_auth(&self.feature_tags, &offer)
            .await?;
        self.handle_invite_outcome(ctx, |session, response| {
            let codecs = SdpSession::parse(&response.body_string())
                .and_then(|sdp| {
                    sdp.media_description("video")
                        .map(|m| (extract_video_codecs(m), sdp.connection.address.clone(), m.port))
                });
            if let Some((codecs, host, port)) = codecs {
                if let Some(codec) = codecs.first() {
                    session.renderer.set_remote_info(codec, &host, port);
                }
            }
            session.renderer.start();
        })
        .await
    }

    /// Map the final INVITE response for the originating flow
    async fn handle_invite_outcome(
        &self,
        ctx: TransactionContext,
        on_established: impl FnOnce(&Self, &crate::infrastructure::protocols::sip::SipResponse),
    ) -> Result<(), SipError> {
        if !ctx.is_sip_response() {
            self.handle_error(ContentSharingError::SessionInitiationFailed(
                "No response to INVITE".to_string(),
            ))
            .await;
            return Ok(());
        }
        match ctx.status_code {
            200 => {
                let response = ctx.response.as_ref().expect("checked above");
                let ack = {
                    let mut dialog = self.ctx.dialog.lock().await;
                    dialog.set_remote_content(response.body_string());
                    dialog.session_established();
                    factory::create_ack(&dialog)?
                };
                self.ctx.transport.send_request_and_wait(ack).await?;
                let _ = self.ctx.set_state(SharingState::Established);
                on_established(self, response);
                let _ = self.ctx.set_state(SharingState::Started);
                self.ctx.notify(|l| l.on_session_started());
                Ok(())
            }
            486 | 603 => {
                self.handle_error(ContentSharingError::SessionInitiationDeclined)
                    .await;
                Ok(())
            }
            487 => {
                self.handle_error(ContentSharingError::SessionInitiationCancelled)
                    .await;
                Ok(())
            }
            code => {
                self.handle_error(ContentSharingError::SessionInitiationFailed(format!(
                    "INVITE answered with {}",
                    code
                )))
                .await;
                Ok(())
            }
        }
    }

    fn start_session_timer(this: &Arc<Self>, expires: Duration) {
        debug!(
            "Session timer armed for session {} ({}s)",
            this.session_id(),
            expires.as_secs()
        );
        let weak = Arc::downgrade(this);
        tokio::spawn(async move {
            tokio::time::sleep(expires).await;
            if let Some(session) = weak.upgrade() {
                if !session.ctx.core.is_interrupted() {
                    info!(
                        "Session timer expired for session {}",
                        session.session_id()
                    );
                    session.terminate(TerminationReason::BySystem).await;
                }
            }
        });
    }

    async fn send_415(&self) {
        let response = {
            let dialog = self.ctx.dialog.lock().await;
            dialog.invite().map(factory::create_415_unsupported)
        };
        if let Some(Ok(response)) = response {
            if let Err(e) = self.ctx.transport.send_response(response).await {
                warn!("Failed to send 415: {}", e);
            }
        }
    }

    async fn reject_terminal(&self, reason: TerminationReason, send_busy: bool) {
        if !self.ctx.core.claim_terminal() {
            return;
        }
        if send_busy {
            let response = {
                let dialog = self.ctx.dialog.lock().await;
                dialog
                    .invite()
                    .map(|invite| factory::create_486_busy(invite, dialog.local_tag()))
            };
            if let Some(Ok(response)) = response {
                if let Err(e) = self.ctx.transport.send_response(response).await {
                    warn!("Failed to send 486 Busy: {}", e);
                }
            }
        }
        self.ctx.set_terminal_state(SharingState::Rejected);
        self.ctx.registry.remove(&self.session_id()).await;
        self.ctx.notify(|l| l.on_session_rejected(reason));
    }

    /// Convert an error into the single terminal notification.
    ///
    /// Idempotent: once some path terminated the session, later errors are
    /// suppressed.
    pub async fn handle_error(&self, error: ContentSharingError) {
        if !self.ctx.core.claim_terminal() {
            return;
        }
        info!("Session {} error: {}", self.session_id(), error);
        self.renderer.stop();
        let (state, _) = error.reason();
        self.ctx.set_terminal_state(state);
        self.ctx.registry.remove(&self.session_id()).await;
        self.ctx.notify(|l| l.on_sharing_error(&error));
    }
}

/// Stored image sharing session
pub struct ImageSharingSession {
    ctx: SharingCtx,
    streamer: Arc<dyn ContentStreamer>,
    feature_tags: Vec<String>,
}

impl ImageSharingSession {
    /// Session for a received INVITE
    pub fn incoming(
        invite: crate::infrastructure::protocols::sip::SipRequest,
        contact: ContactId,
        content: ContentDescriptor,
        local_party: &str,
        streamer: Arc<dyn ContentStreamer>,
        transport: Arc<dyn SipTransport>,
        registry: Arc<SharingRegistry>,
        credentials: UserCredentials,
        ringing_period: Duration,
    ) -> Result<Self, SipError> {
        let dialog = DialogPath::terminating(invite, local_party)?;
        Ok(Self {
            ctx: SharingCtx::new(
                contact,
                Direction::Incoming,
                content,
                dialog,
                SharingState::Invited,
                transport,
                registry,
                credentials,
                ringing_period,
            ),
            streamer,
            feature_tags: vec![crate::domain::capability::FEATURE_TAG_IMAGE_SHARE.to_string()],
        })
    }

    /// Session for a locally initiated share
    pub fn outgoing(
        contact: ContactId,
        content: ContentDescriptor,
        local_party: &str,
        local_host: &str,
        streamer: Arc<dyn ContentStreamer>,
        transport: Arc<dyn SipTransport>,
        registry: Arc<SharingRegistry>,
        credentials: UserCredentials,
        ringing_period: Duration,
    ) -> Self {
        let dialog = DialogPath::originating(
            crate::infrastructure::protocols::sip::generate_call_id(local_host),
            local_party,
            contact.to_sip_uri(local_host),
        );
        Self {
            ctx: SharingCtx::new(
                contact,
                Direction::Outgoing,
                content,
                dialog,
                SharingState::Initiating,
                transport,
                registry,
                credentials,
                ringing_period,
            ),
            streamer,
            feature_tags: vec![crate::domain::capability::FEATURE_TAG_IMAGE_SHARE.to_string()],
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.ctx.core.session_id()
    }

    pub fn state(&self) -> SharingState {
        self.ctx.state()
    }

    pub fn content(&self) -> &ContentDescriptor {
        &self.ctx.content
    }

    pub fn add_listener(&self, listener: Arc<dyn ContentSharingListener>) {
        self.ctx.add_listener(listener);
    }

    pub fn accept_invitation(&self) -> Result<(), DomainError> {
        if !self.ctx.core.gate().accept() {
            return Err(DomainError::PermissionDenied(
                "Invitation already answered".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn reject_invitation(&self) -> Result<(), DomainError> {
        if !self.ctx.core.gate().reject(InvitationAnswer::RejectedDecline) {
            return Err(DomainError::PermissionDenied(
                "Invitation already answered".to_string(),
            ));
        }
        let response = {
            let dialog = self.ctx.dialog.lock().await;
            dialog
                .invite()
                .map(|invite| factory::create_603_decline(invite, dialog.local_tag()))
        };
        if let Some(Ok(response)) = response {
            if let Err(e) = self.ctx.transport.send_response(response).await {
                warn!("Failed to send 603 Decline: {}", e);
            }
        }
        Ok(())
    }

    pub async fn abort_session(&self) -> Result<(), DomainError> {
        if self.ctx.core.is_interrupted() {
            return Err(DomainError::InvalidOperation(
                "Session already terminated".to_string(),
            ));
        }
        self.streamer.abort();
        let signalled_worker = self.ctx.core.request_abort(TerminationReason::ByUser);
        if !signalled_worker || self.ctx.core.direction() == Direction::Outgoing {
            self.terminate(TerminationReason::ByUser).await;
        }
        Ok(())
    }

    pub async fn receive_bye(&self) {
        self.terminate_inner(TerminationReason::ByRemote, false).await;
    }

    async fn terminate(&self, reason: TerminationReason) {
        self.terminate_inner(reason, true).await;
    }

    async fn terminate_inner(&self, reason: TerminationReason, send_signal: bool) {
        if !self.ctx.core.claim_terminal() {
            return;
        }
        let signal = {
            let mut dialog = self.ctx.dialog.lock().await;
            let signal = if send_signal && !dialog.is_terminated() {
                if dialog.is_session_established() {
                    factory::create_bye(&mut dialog).ok()
                } else if self.ctx.core.direction() == Direction::Outgoing
                    && !dialog.is_sig_established()
                {
                    factory::create_cancel(&dialog).ok()
                } else {
                    None
                }
            } else {
                None
            };
            dialog.terminate();
            signal
        };
        if let Some(signal) = signal {
            if let Err(e) = self.ctx.transport.send_request_and_wait(signal).await {
                warn!("Dialog teardown failed for session {}: {}", self.session_id(), e);
            }
        }
        self.ctx.set_terminal_state(SharingState::Aborted);
        self.ctx.registry.remove(&self.session_id()).await;
        self.ctx.notify(|l| l.on_session_aborted(reason));
    }

    /// Background processing for the terminating side
    pub async fn run_terminating(self: Arc<Self>) {
        info!(
            "Initiate image sharing session {} as terminating",
            self.session_id()
        );
        if let Err(e) = self.clone().run_terminating_inner().await {
            self.handle_error(ContentSharingError::UnexpectedException(e.to_string()))
                .await;
        }
    }

    async fn run_terminating_inner(self: Arc<Self>) -> Result<(), SipError> {
        let ringing = {
            let dialog = self.ctx.dialog.lock().await;
            let invite = dialog
                .invite()
                .ok_or_else(|| SipError::InvalidMessage("No INVITE on dialog".to_string()))?;
            factory::create_180_ringing(invite, dialog.local_tag())?
        };
        self.ctx.transport.send_response(ringing).await?;
        let _ = self.ctx.set_state(SharingState::Ringing);

        // The offer must carry an MSRP message media line
        let remote_sdp = {
            let dialog = self.ctx.dialog.lock().await;
            dialog.remote_content().map(str::to_string)
        };
        let Some(remote_sdp) = remote_sdp.and_then(|raw| SdpSession::parse(&raw)) else {
            self.handle_error(ContentSharingError::SessionInitiationFailed(
                "Unparseable SDP offer".to_string(),
            ))
            .await;
            return Ok(());
        };
        let Some(msrp_media) = remote_sdp.media_description("message").cloned() else {
            self.send_415().await;
            self.handle_error(ContentSharingError::UnsupportedMediaType).await;
            return Ok(());
        };

        self.ctx.notify(|l| l.on_session_invited(&self.ctx.content));

        let answer = self.ctx.core.gate().wait_answer(self.ctx.ringing_period).await;
        match answer {
            InvitationAnswer::RejectedDecline | InvitationAnswer::RejectedBusy => {
                self.reject_terminal(TerminationReason::ByUser, false).await;
                return Ok(());
            }
            InvitationAnswer::Timeout => {
                self.reject_terminal(TerminationReason::ByTimeout, true).await;
                return Ok(());
            }
            InvitationAnswer::Canceled => {
                self.reject_terminal(TerminationReason::ByRemote, false).await;
                return Ok(());
            }
            InvitationAnswer::RejectedBySystem => {
                if let Some(reason) = self.ctx.core.abort_requested() {
                    self.terminate(reason).await;
                } else if self.ctx.core.claim_terminal() {
                    self.ctx.set_terminal_state(SharingState::Rejected);
                    self.ctx.registry.remove(&self.session_id()).await;
                }
                return Ok(());
            }
            InvitationAnswer::Accepted => {
                self.ctx.core.set_accepted();
                let _ = self.ctx.set_state(SharingState::Accepting);
                self.ctx.notify(|l| l.on_session_accepted());
            }
        }

        let answer_sdp = SdpSession::create_image_transfer(
            "0.0.0.0",
            msrp_media.port,
            "msrp://0.0.0.0:20000/session;tcp",
            &self.ctx.content.mime_type,
            SdpDirection::RecvOnly,
        )
        .to_string();

        if self.ctx.core.is_interrupted() {
            debug!("Session {} interrupted: end of processing", self.session_id());
            return Ok(());
        }

        let ok_response = {
            let mut dialog = self.ctx.dialog.lock().await;
            dialog.set_local_content(answer_sdp.clone());
            let response =
                factory::create_200_ok_invite(&dialog, &self.feature_tags, &answer_sdp)?;
            dialog.sig_established();
            response
        };
        let ctx = self
            .ctx
            .transport
            .send_response_and_wait_ack(ok_response)
            .await?;

        if !ctx.is_sip_ack() {
            self.handle_error(ContentSharingError::SessionInitiationFailed(
                "No ACK received".to_string(),
            ))
            .await;
            return Ok(());
        }

        {
            let mut dialog = self.ctx.dialog.lock().await;
            dialog.session_established();
        }
        let _ = self.ctx.set_state(SharingState::Established);
        let _ = self.ctx.set_state(SharingState::Started);
        self.ctx.notify(|l| l.on_session_started());

        self.run_transfer().await;
        Ok(())
    }

    /// Background processing for the originating side
    pub async fn run_originating(self: Arc<Self>) {
        info!(
            "Initiate image sharing session {} as originating",
            self.session_id()
        );
        if let Err(e) = self.clone().run_originating_inner().await {
            self.handle_error(ContentSharingError::UnexpectedException(e.to_string()))
                .await;
        }
    }

    async fn run_originating_inner(self: Arc<Self>) -> Result<(), SipError> {
        let offer = SdpSession::create_image_transfer(
            "0.0.0.0",
            20000,
            "msrp://0.0.0.0:20000/session;tcp",
            &self.ctx.content.mime_type,
            SdpDirection::SendOnly,
        )
        .to_string();
        {
            let mut dialog = self.ctx.dialog.lock().await;
            dialog.set_local_content(offer.clone());
        }

        let ctx = self
            .ctx
            .send_invite_with_auth(&self.feature_tags, &offer)
            .await?;

        if !ctx.is_sip_response() {
            self.handle_error(ContentSharingError::SessionInitiationFailed(
                "No response to INVITE".to_string(),
            ))
            .await;
            return Ok(());
        }
        match ctx.status_code {
            200 => {
                let response = ctx.response.as_ref().expect("checked above");
                let ack = {
                    let mut dialog = self.ctx.dialog.lock().await;
                    dialog.set_remote_content(response.body_string());
                    dialog.session_established();
                    factory::create_ack(&dialog)?
                };
                self.ctx.transport.send_request_and_wait(ack).await?;
                let _ = self.ctx.set_state(SharingState::Established);
                let _ = self.ctx.set_state(SharingState::Started);
                self.ctx.notify(|l| l.on_session_started());
                self.run_transfer().await;
            }
            486 | 603 => {
                self.handle_error(ContentSharingError::SessionInitiationDeclined)
                    .await;
            }
            487 => {
                self.handle_error(ContentSharingError::SessionInitiationCancelled)
                    .await;
            }
            code => {
                self.handle_error(ContentSharingError::SessionInitiationFailed(format!(
                    "INVITE answered with {}",
                    code
                )))
                .await;
            }
        }
        Ok(())
    }

    /// Stream the image and deliver the terminal notification
    async fn run_transfer(&self) {
        let progress = |current: u64, total: u64| {
            self.ctx.notify(|l| l.on_transfer_progress(current, total));
        };
        match self.streamer.stream(&self.ctx.content, &progress).await {
            Ok(()) => {
                if !self.ctx.core.claim_terminal() {
                    return;
                }
                self.ctx.set_terminal_state(SharingState::Transferred);
                self.ctx.registry.remove(&self.session_id()).await;
                self.ctx.notify(|l| l.on_content_transferred(&self.ctx.content));
            }
            Err(e) => {
                if let Some(reason) = self.ctx.core.abort_requested() {
                    self.terminate(reason).await;
                } else {
                    self.handle_error(ContentSharingError::MediaTransferFailed(e)).await;
                }
            }
        }
    }

    async fn send_415(&self) {
        let response = {
            let dialog = self.ctx.dialog.lock().await;
            dialog.invite().map(factory::create_415_unsupported)
        };
        if let Some(Ok(response)) = response {
            if let Err(e) = self.ctx.transport.send_response(response).await {
                warn!("Failed to send 415: {}", e);
            }
        }
    }

    async fn reject_terminal(&self, reason: TerminationReason, send_busy: bool) {
        if !self.ctx.core.claim_terminal() {
            return;
        }
        if send_busy {
            let response = {
                let dialog = self.ctx.dialog.lock().await;
                dialog
                    .invite()
                    .map(|invite| factory::create_486_busy(invite, dialog.local_tag()))
            };
            if let Some(Ok(response)) = response {
                if let Err(e) = self.ctx.transport.send_response(response).await {
                    warn!("Failed to send 486 Busy: {}", e);
                }
            }
        }
        self.ctx.set_terminal_state(SharingState::Rejected);
        self.ctx.registry.remove(&self.session_id()).await;
        self.ctx.notify(|l| l.on_session_rejected(reason));
    }

    pub async fn handle_error(&self, error: ContentSharingError) {
        if !self.ctx.core.claim_terminal() {
            return;
        }
        info!("Session {} error: {}", self.session_id(), error);
        let (state, _) = error.reason();
        self.ctx.set_terminal_state(state);
        self.ctx.registry.remove(&self.session_id()).await;
        self.ctx.notify(|l| l.on_sharing_error(&error));
    }
}
