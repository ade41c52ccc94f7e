//! File transfer service
//!
//! Owns the HTTP transfer session registry, enforces the session and
//! concurrent-outgoing capacity limits, and rebuilds sessions from persisted
//! resume records.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::{Config, FileTransferConfig, HttpConfig};
use crate::domain::session::Direction;
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{ContactId, ContentDescriptor, TransferId};
use crate::domain::transfer::{FileTransferState, PauseReason};
use crate::infrastructure::persistence::MessagingLog;
use crate::infrastructure::protocols::http::{HttpDownloadManager, HttpUploadManager};
use crate::infrastructure::protocols::sip::ImsLink;

use super::dequeue::{ChatDispatcher, DequeueTask};
use super::session::file_transfer::{HttpFileTransferSession, TransferRegistry};
use super::session::FileTransferListener;

/// Parameters of an inbound file transfer invitation, as parsed from the
/// transfer info document by the messaging layer
pub struct FileTransferInvite {
    pub transfer_id: TransferId,
    pub contact: ContactId,
    /// Local destination descriptor
    pub content: ContentDescriptor,
    /// Download location on the content server
    pub download_url: String,
    pub icon: Option<ContentDescriptor>,
    pub file_expiration: DateTime<Utc>,
    pub icon_expiration: Option<DateTime<Utc>>,
    pub remote_instance: Option<String>,
    pub chat_id: Option<String>,
}

pub struct FileTransferService {
    registry: Arc<TransferRegistry>,
    settings: FileTransferConfig,
    http: HttpConfig,
    link: Arc<dyn ImsLink>,
    log: Arc<dyn MessagingLog>,
}

impl FileTransferService {
    pub fn new(config: &Config, link: Arc<dyn ImsLink>, log: Arc<dyn MessagingLog>) -> Self {
        Self {
            registry: Arc::new(TransferRegistry::new()),
            settings: config.file_transfer.clone(),
            http: config.http.clone(),
            link,
            log,
        }
    }

    pub fn registry(&self) -> Arc<TransferRegistry> {
        self.registry.clone()
    }

    fn download_manager(&self) -> Result<Arc<HttpDownloadManager>, DomainError> {
        HttpDownloadManager::new(Duration::from_secs(self.http.connect_timeout_secs))
            .map(Arc::new)
            .map_err(|e| DomainError::Internal(e.to_string()))
    }

    fn upload_manager(&self) -> Result<Arc<HttpUploadManager>, DomainError> {
        HttpUploadManager::new(
            self.http.server_addr.clone(),
            Duration::from_secs(self.http.connect_timeout_secs),
            self.http.upload_slice_size,
        )
        .map(Arc::new)
        .map_err(|e| DomainError::Internal(e.to_string()))
    }

    async fn check_session_capacity(&self) -> Result<(), DomainError> {
        if self.registry.len().await >= self.settings.max_sessions {
            return Err(DomainError::CapacityExceeded(format!(
                "max transfer sessions ({}) reached",
                self.settings.max_sessions
            )));
        }
        Ok(())
    }

    async fn check_outgoing_capacity(&self) -> Result<(), DomainError> {
        let outgoing = self
            .registry
            .all()
            .await
            .iter()
            .filter(|s| s.direction() == Direction::Outgoing && !s.state().is_terminal())
            .count();
        if outgoing >= self.settings.max_concurrent_outgoing {
            return Err(DomainError::CapacityExceeded(format!(
                "max concurrent outgoing transfers ({}) reached",
                self.settings.max_concurrent_outgoing
            )));
        }
        Ok(())
    }

    /// Handle an inbound HTTP file transfer invitation
    pub async fn receive_file_transfer_invite(
        &self,
        invite: FileTransferInvite,
        listener: Arc<dyn FileTransferListener>,
    ) -> Result<Arc<HttpFileTransferSession>, DomainError> {
        info!(
            "Receive file transfer invitation from {} ({} bytes)",
            invite.contact, invite.content.size
        );
        self.check_session_capacity().await?;

        let session = Arc::new(HttpFileTransferSession::download_from_invite(
            invite.transfer_id,
            invite.contact,
            invite.content,
            invite.download_url,
            invite.icon,
            invite.file_expiration,
            invite.icon_expiration,
            invite.remote_instance,
            invite.chat_id,
            &self.settings,
            self.link.is_roaming(),
            self.download_manager()?,
            self.log.clone(),
            self.registry.clone(),
        ));
        session.add_listener(listener);
        self.registry
            .add(session.session_id(), session.clone())
            .await?;
        tokio::spawn(session.clone().run());
        Ok(session)
    }

    /// Start an outgoing HTTP file transfer
    pub async fn initiate_file_transfer(
        &self,
        contact: ContactId,
        content: ContentDescriptor,
        chat_id: Option<String>,
        listener: Arc<dyn FileTransferListener>,
    ) -> Result<Arc<HttpFileTransferSession>, DomainError> {
        info!(
            "Initiate file transfer to {} ({} bytes)",
            contact, content.size
        );
        self.check_session_capacity().await?;
        self.check_outgoing_capacity().await?;

        let upload = self.upload_manager()?;
        let upload_url = upload.server_addr().to_string();
        let session = Arc::new(HttpFileTransferSession::upload(
            TransferId::new(),
            contact,
            content,
            upload_url,
            chat_id,
            &self.settings,
            upload,
            self.log.clone(),
            self.registry.clone(),
        ));
        session.add_listener(listener);
        self.registry
            .add(session.session_id(), session.clone())
            .await?;
        tokio::spawn(session.clone().run());
        Ok(session)
    }

    /// Resolve a live session by its transfer id
    pub async fn session_by_transfer_id(
        &self,
        transfer_id: &TransferId,
    ) -> Option<Arc<HttpFileTransferSession>> {
        self.registry
            .all()
            .await
            .into_iter()
            .find(|s| s.transfer_id() == transfer_id)
    }

    /// Pause a live transfer
    pub async fn pause_file_transfer(&self, transfer_id: &TransferId) -> Result<(), DomainError> {
        let session = self
            .session_by_transfer_id(transfer_id)
            .await
            .ok_or_else(|| DomainError::NotFound(format!("transfer {}", transfer_id)))?;
        session.pause_file_transfer().await
    }

    /// Resume a transfer paused by the user.
    ///
    /// Validation order: network connectivity, then an in-place resume of a
    /// live session, otherwise reconstruction from the persisted record
    /// under the capacity limits. Every refusal is a typed error, never a
    /// silent failure.
    pub async fn resume_file_transfer(
        &self,
        transfer_id: &TransferId,
        listener: Arc<dyn FileTransferListener>,
    ) -> Result<(), DomainError> {
        if !self.link.is_connected() {
            return Err(DomainError::PermissionDenied(
                "Network is not connected".to_string(),
            ));
        }

        if let Some(session) = self.session_by_transfer_id(transfer_id).await {
            if session.state() == FileTransferState::Paused(PauseReason::BySystem) {
                return Err(DomainError::PermissionDenied(
                    "Transfer paused by system; waiting for reconstruction".to_string(),
                ));
            }
            return session.resume_file_transfer();
        }

        // No live session: rebuild one from the persisted record
        let record = self
            .log
            .get_resume_entry(transfer_id)
            .await
            .ok_or_else(|| DomainError::NotFound(format!("transfer {}", transfer_id)))?;
        if !record.is_accepted {
            return Err(DomainError::PermissionDenied(
                "Transfer was never accepted".to_string(),
            ));
        }
        self.check_session_capacity().await?;

        let session = match record.direction {
            Direction::Incoming => Arc::new(HttpFileTransferSession::download_from_resume(
                &record,
                &self.settings,
                self.download_manager()?,
                self.log.clone(),
                self.registry.clone(),
            )),
            Direction::Outgoing => {
                self.check_outgoing_capacity().await?;
                Arc::new(HttpFileTransferSession::upload_from_resume(
                    &record,
                    &self.settings,
                    self.upload_manager()?,
                    self.log.clone(),
                    self.registry.clone(),
                ))
            }
        };
        debug!(
            "Rebuilt transfer {} from resume record at offset {}",
            transfer_id, record.offset
        );
        session.add_listener(listener);
        self.registry
            .add(session.session_id(), session.clone())
            .await?;
        tokio::spawn(session.clone().run());
        Ok(())
    }

    /// Abort a live transfer
    pub async fn abort_transfer(&self, transfer_id: &TransferId) -> Result<(), DomainError> {
        let session = self
            .session_by_transfer_id(transfer_id)
            .await
            .ok_or_else(|| DomainError::NotFound(format!("transfer {}", transfer_id)))?;
        session.abort_transfer().await
    }

    /// Redispatch all queued one-to-one messages
    pub async fn dequeue_queued_messages(&self, dispatcher: Arc<dyn ChatDispatcher>) {
        DequeueTask::new(self.log.clone(), dispatcher).run().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::InMemoryMessagingLog;
    use crate::infrastructure::protocols::sip::ScriptedSipTransport;

    struct NullListener;

    impl FileTransferListener for NullListener {
        fn on_session_invited(
            &self,
            _content: &ContentDescriptor,
            _file_expiration: DateTime<Utc>,
            _icon_expiration: Option<DateTime<Utc>>,
        ) {
        }
        fn on_session_auto_accepted(
            &self,
            _content: &ContentDescriptor,
            _file_expiration: DateTime<Utc>,
            _icon_expiration: Option<DateTime<Utc>>,
        ) {
        }
        fn on_session_accepted(&self) {}
        fn on_session_rejected(&self, _reason: crate::domain::session::TerminationReason) {}
        fn on_session_aborted(&self, _reason: crate::domain::session::TerminationReason) {}
        fn on_transfer_progress(&self, _current: u64, _total: u64) {}
        fn on_file_transferred(
            &self,
            _content: &ContentDescriptor,
            _file_expiration: DateTime<Utc>,
            _icon_expiration: Option<DateTime<Utc>>,
        ) {
        }
        fn on_transfer_paused(&self, _reason: PauseReason) {}
        fn on_transfer_resumed(&self) {}
        fn on_transfer_error(&self, _error: &crate::domain::transfer::FileSharingError) {}
    }

    fn service(max_sessions: usize) -> (FileTransferService, Arc<ScriptedSipTransport>) {
        let mut config = Config::default();
        config.file_transfer.max_sessions = max_sessions;
        config.file_transfer.auto_accept = false;
        let link = Arc::new(ScriptedSipTransport::new());
        let log = Arc::new(InMemoryMessagingLog::new());
        (
            FileTransferService::new(&config, link.clone(), log),
            link,
        )
    }

    fn invite(id: &str) -> FileTransferInvite {
        FileTransferInvite {
            transfer_id: TransferId::from_string(id),
            contact: ContactId::parse("+33612345678").unwrap(),
            content: ContentDescriptor::new(
                format!("/tmp/chitchat-{}.bin", id),
                "application/octet-stream",
                2048,
                "f.bin",
            ),
            download_url: "https://ft.example.com/dl/1".to_string(),
            icon: None,
            file_expiration: Utc::now() + chrono::Duration::hours(1),
            icon_expiration: None,
            remote_instance: None,
            chat_id: None,
        }
    }

    #[tokio::test]
    async fn test_session_capacity_enforced() {
        let (service, _link) = service(1);
        service
            .receive_file_transfer_invite(invite("ft-1"), Arc::new(NullListener))
            .await
            .unwrap();

        let result = service
            .receive_file_transfer_invite(invite("ft-2"), Arc::new(NullListener))
            .await;
        assert!(matches!(
            result.map(|_| ()),
            Err(DomainError::CapacityExceeded(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_requires_connectivity() {
        let (service, link) = service(4);
        link.set_connected(false);
        let result = service
            .resume_file_transfer(&TransferId::from_string("ft-x"), Arc::new(NullListener))
            .await;
        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_resume_unknown_transfer_not_found() {
        let (service, _link) = service(4);
        let result = service
            .resume_file_transfer(&TransferId::from_string("ft-x"), Arc::new(NullListener))
            .await;
        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_lookup_by_transfer_id() {
        let (service, _link) = service(4);
        let session = service
            .receive_file_transfer_invite(invite("ft-42"), Arc::new(NullListener))
            .await
            .unwrap();
        let found = service
            .session_by_transfer_id(&TransferId::from_string("ft-42"))
            .await
            .unwrap();
        assert_eq!(found.session_id(), session.session_id());
    }
}
