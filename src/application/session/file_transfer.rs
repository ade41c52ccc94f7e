//! Resumable HTTP file transfer sessions
//!
//! One worker task drives each transfer from invitation (or queue) to a
//! single terminal notification. Pause requests take effect at chunk
//! boundaries; the acknowledged offset is persisted so a transfer can be
//! rebuilt from its resume record after a restart.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::config::FileTransferConfig;
use crate::domain::session::{Direction, InvitationAnswer, TerminationReason};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{ContactId, ContentDescriptor, SessionId, TransferId};
use crate::domain::transfer::{
    should_auto_accept, FileSharingError, FileTransferState, FtHttpResume, PauseReason,
};
use crate::infrastructure::persistence::MessagingLog;
use crate::infrastructure::protocols::http::{
    HttpDownloadManager, HttpTransferError, HttpUploadManager, TransferOutcome,
};

use super::listener::FileTransferListener;
use super::registry::SessionRegistry;
use super::SessionCore;

pub type TransferRegistry = SessionRegistry<HttpFileTransferSession>;

enum TransferKind {
    Download(Arc<HttpDownloadManager>),
    Upload(Arc<HttpUploadManager>),
}

pub struct HttpFileTransferSession {
    core: SessionCore,
    transfer_id: TransferId,
    /// Local content: destination for downloads, source for uploads
    content: ContentDescriptor,
    /// Remote content location on the HTTP server
    remote_url: String,
    icon: Option<ContentDescriptor>,
    file_expiration: DateTime<Utc>,
    icon_expiration: Option<DateTime<Utc>>,
    remote_instance: Option<String>,
    chat_id: Option<String>,
    kind: TransferKind,
    state: std::sync::Mutex<FileTransferState>,
    listeners: std::sync::Mutex<Vec<Arc<dyn FileTransferListener>>>,
    log: Arc<dyn MessagingLog>,
    registry: Arc<TransferRegistry>,
    max_size: u64,
    offset: AtomicU64,
    /// Worker parked or running; false once run() returns
    worker_active: AtomicBool,
    resume_notify: Notify,
    timestamp: DateTime<Utc>,
}

impl HttpFileTransferSession {
    /// Terminating session built from a received file transfer invitation.
    ///
    /// The auto-accept policy is evaluated here, once per session.
    #[allow(clippy::too_many_arguments)]
    pub fn download_from_invite(
        transfer_id: TransferId,
        contact: ContactId,
        content: ContentDescriptor,
        remote_url: impl Into<String>,
        icon: Option<ContentDescriptor>,
        file_expiration: DateTime<Utc>,
        icon_expiration: Option<DateTime<Utc>>,
        remote_instance: Option<String>,
        chat_id: Option<String>,
        settings: &FileTransferConfig,
        is_roaming: bool,
        download: Arc<HttpDownloadManager>,
        log: Arc<dyn MessagingLog>,
        registry: Arc<TransferRegistry>,
    ) -> Self {
        let session = Self {
            core: SessionCore::new(contact, Direction::Incoming),
            transfer_id,
            remote_url: remote_url.into(),
            icon,
            file_expiration,
            icon_expiration,
            remote_instance,
            chat_id,
            kind: TransferKind::Download(download),
            state: std::sync::Mutex::new(FileTransferState::Invited),
            listeners: std::sync::Mutex::new(Vec::new()),
            log,
            registry,
            max_size: settings.max_size,
            offset: AtomicU64::new(0),
            worker_active: AtomicBool::new(false),
            resume_notify: Notify::new(),
            timestamp: Utc::now(),
            content,
        };
        if should_auto_accept(
            settings.warn_size,
            session.content.size,
            is_roaming,
            settings.auto_accept_in_roaming,
            settings.auto_accept,
        ) {
            session.core.set_accepted();
        }
        session
    }

    /// Terminating session rebuilt from a resume record (user acceptance or
    /// resume after interruption)
    pub fn download_from_resume(
        resume: &FtHttpResume,
        settings: &FileTransferConfig,
        download: Arc<HttpDownloadManager>,
        log: Arc<dyn MessagingLog>,
        registry: Arc<TransferRegistry>,
    ) -> Self {
        let session = Self {
            core: SessionCore::new(resume.contact.clone(), Direction::Incoming),
            transfer_id: resume.transfer_id.clone(),
            content: resume.file.clone(),
            remote_url: resume.server_address.clone(),
            icon: resume.icon.clone(),
            file_expiration: resume.file_expiration,
            icon_expiration: resume.icon_expiration,
            remote_instance: None,
            chat_id: resume.chat_id.clone(),
            kind: TransferKind::Download(download),
            state: std::sync::Mutex::new(FileTransferState::Accepting),
            listeners: std::sync::Mutex::new(Vec::new()),
            log,
            registry,
            max_size: settings.max_size,
            offset: AtomicU64::new(resume.offset),
            worker_active: AtomicBool::new(false),
            resume_notify: Notify::new(),
            timestamp: resume.timestamp,
        };
        session.core.set_accepted();
        session
    }

    /// Originating upload session
    #[allow(clippy::too_many_arguments)]
    pub fn upload(
        transfer_id: TransferId,
        contact: ContactId,
        content: ContentDescriptor,
        upload_url: impl Into<String>,
        chat_id: Option<String>,
        settings: &FileTransferConfig,
        upload: Arc<HttpUploadManager>,
        log: Arc<dyn MessagingLog>,
        registry: Arc<TransferRegistry>,
    ) -> Self {
        let session = Self {
            core: SessionCore::new(contact, Direction::Outgoing),
            transfer_id,
            content,
            remote_url: upload_url.into(),
            icon: None,
            file_expiration: Utc::now(),
            icon_expiration: None,
            remote_instance: None,
            chat_id,
            kind: TransferKind::Upload(upload),
            state: std::sync::Mutex::new(FileTransferState::Queued),
            listeners: std::sync::Mutex::new(Vec::new()),
            log,
            registry,
            max_size: settings.max_size,
            offset: AtomicU64::new(0),
            worker_active: AtomicBool::new(false),
            resume_notify: Notify::new(),
            timestamp: Utc::now(),
        };
        session.core.set_accepted();
        session
    }

    /// Originating upload rebuilt from a resume record
    pub fn upload_from_resume(
        resume: &FtHttpResume,
        settings: &FileTransferConfig,
        upload: Arc<HttpUploadManager>,
        log: Arc<dyn MessagingLog>,
        registry: Arc<TransferRegistry>,
    ) -> Self {
        let session = Self {
            core: SessionCore::new(resume.contact.clone(), Direction::Outgoing),
            transfer_id: resume.transfer_id.clone(),
            content: resume.file.clone(),
            remote_url: resume.server_address.clone(),
            icon: resume.icon.clone(),
            file_expiration: resume.file_expiration,
            icon_expiration: resume.icon_expiration,
            remote_instance: None,
            chat_id: resume.chat_id.clone(),
            kind: TransferKind::Upload(upload),
            state: std::sync::Mutex::new(FileTransferState::Accepting),
            listeners: std::sync::Mutex::new(Vec::new()),
            log,
            registry,
            max_size: settings.max_size,
            offset: AtomicU64::new(resume.offset),
            worker_active: AtomicBool::new(false),
            resume_notify: Notify::new(),
            timestamp: resume.timestamp,
        };
        session.core.set_accepted();
        session
    }

    pub fn session_id(&self) -> SessionId {
        self.core.session_id()
    }

    pub fn transfer_id(&self) -> &TransferId {
        &self.transfer_id
    }

    pub fn contact(&self) -> &ContactId {
        self.core.contact()
    }

    pub fn direction(&self) -> Direction {
        self.core.direction()
    }

    pub fn content(&self) -> &ContentDescriptor {
        &self.content
    }

    pub fn state(&self) -> FileTransferState {
        *self.state.lock().unwrap()
    }

    pub fn current_offset(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }

    pub fn is_accepted(&self) -> bool {
        self.core.is_accepted()
    }

    pub fn add_listener(&self, listener: Arc<dyn FileTransferListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn notify(&self, f: impl Fn(&dyn FileTransferListener)) {
        let listeners: Vec<_> = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            f(listener.as_ref());
        }
    }

    fn set_state(&self, new_state: FileTransferState) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        if !state.can_transition_to(&new_state) {
            return Err(DomainError::InvalidStateTransition(format!(
                "{} -> {}",
                state.name(),
                new_state.name()
            )));
        }
        debug!(
            "Transfer {}: {} -> {}",
            self.transfer_id,
            state.name(),
            new_state.name()
        );
        *state = new_state;
        Ok(())
    }

    fn set_terminal_state(&self, new_state: FileTransferState) {
        if let Err(e) = self.set_state(new_state) {
            debug!("Terminal transition suppressed: {}", e);
        }
    }

    fn resume_record(&self) -> FtHttpResume {
        FtHttpResume {
            direction: self.core.direction(),
            contact: self.core.contact().clone(),
            chat_id: self.chat_id.clone(),
            transfer_id: self.transfer_id.clone(),
            file: self.content.clone(),
            icon: self.icon.clone(),
            server_address: self.remote_url.clone(),
            file_expiration: self.file_expiration,
            icon_expiration: self.icon_expiration,
            is_accepted: self.core.is_accepted(),
            offset: self.current_offset(),
            timestamp: self.timestamp,
        }
    }

    /// Accept a pending invitation
    pub fn accept_invitation(&self) -> Result<(), DomainError> {
        if !self.core.gate().accept() {
            return Err(DomainError::PermissionDenied(
                "Invitation already answered".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject a pending invitation
    pub fn reject_invitation(&self) -> Result<(), DomainError> {
        if !self.core.gate().reject(InvitationAnswer::RejectedDecline) {
            return Err(DomainError::PermissionDenied(
                "Invitation already answered".to_string(),
            ));
        }
        Ok(())
    }

    /// Pause the byte stream; only valid while established and streaming
    pub async fn pause_file_transfer(&self) -> Result<(), DomainError> {
        if self.state() != FileTransferState::Started {
            return Err(DomainError::PermissionDenied(format!(
                "Cannot pause transfer in state {}",
                self.state().name()
            )));
        }
        self.set_state(FileTransferState::Paused(PauseReason::ByUser))?;
        match &self.kind {
            TransferKind::Download(m) => m.pause(),
            TransferKind::Upload(m) => m.pause(),
        }
        self.log
            .set_resume_offset(&self.transfer_id, self.current_offset())
            .await;
        self.notify(|l| l.on_transfer_paused(PauseReason::ByUser));
        Ok(())
    }

    /// Stack-driven pause (connectivity loss); not user-resumable in place
    pub async fn pause_by_system(&self) -> Result<(), DomainError> {
        if self.state() != FileTransferState::Started {
            return Err(DomainError::InvalidOperation(format!(
                "Cannot pause transfer in state {}",
                self.state().name()
            )));
        }
        self.set_state(FileTransferState::Paused(PauseReason::BySystem))?;
        match &self.kind {
            TransferKind::Download(m) => m.pause(),
            TransferKind::Upload(m) => m.pause(),
        }
        self.log.add_resume_entry(self.resume_record()).await;
        self.notify(|l| l.on_transfer_paused(PauseReason::BySystem));
        Ok(())
    }

    /// Resume a transfer paused by the user.
    ///
    /// Capacity and connectivity validation happens in the owning service;
    /// this only restarts a live, user-paused session.
    pub fn resume_file_transfer(&self) -> Result<(), DomainError> {
        if self.state() != FileTransferState::Paused(PauseReason::ByUser) {
            return Err(DomainError::PermissionDenied(format!(
                "Cannot resume transfer in state {}",
                self.state().name()
            )));
        }
        self.set_state(FileTransferState::Started)?;
        match &self.kind {
            TransferKind::Download(m) => m.reset(),
            TransferKind::Upload(m) => m.reset(),
        }
        self.notify(|l| l.on_transfer_resumed());
        self.resume_notify.notify_one();
        Ok(())
    }

    /// Abort the transfer; asynchronous, the terminal notification follows
    pub async fn abort_transfer(&self) -> Result<(), DomainError> {
        if self.core.is_interrupted() {
            return Err(DomainError::InvalidOperation(
                "Transfer already terminated".to_string(),
            ));
        }
        self.core.request_abort(TerminationReason::ByUser);
        match &self.kind {
            TransferKind::Download(m) => m.abort(),
            TransferKind::Upload(m) => m.abort(),
        }
        self.resume_notify.notify_one();
        if !self.worker_active.load(Ordering::SeqCst) {
            // No worker left to observe the signal (paused by system or
            // never started); terminate from here
            self.terminate_aborted(TerminationReason::ByUser).await;
        }
        Ok(())
    }

    async fn terminate_aborted(&self, reason: TerminationReason) {
        if !self.core.claim_terminal() {
            return;
        }
        self.set_terminal_state(FileTransferState::Aborted);
        self.log.remove_resume_entry(&self.transfer_id).await;
        self.registry.remove(&self.session_id()).await;
        self.notify(|l| l.on_session_aborted(reason));
    }

    async fn reject_terminal(&self, reason: TerminationReason) {
        if !self.core.claim_terminal() {
            return;
        }
        self.set_terminal_state(FileTransferState::Rejected);
        self.log.remove_resume_entry(&self.transfer_id).await;
        self.registry.remove(&self.session_id()).await;
        self.notify(|l| l.on_session_rejected(reason));
    }

    /// Convert an error into the single terminal notification; idempotent
    pub async fn handle_error(&self, error: FileSharingError) {
        if !self.core.claim_terminal() {
            return;
        }
        info!(
            "Transfer error for session {} transfer {}: {}",
            self.session_id(),
            self.transfer_id,
            error
        );
        let (state, _) = error.reason();
        self.set_terminal_state(state);
        self.log.remove_resume_entry(&self.transfer_id).await;
        self.registry.remove(&self.session_id()).await;
        self.notify(|l| l.on_transfer_error(&error));
    }

    /// Background processing
    pub async fn run(self: Arc<Self>) {
        self.worker_active.store(true, Ordering::SeqCst);
        let result = self.run_inner().await;
        self.worker_active.store(false, Ordering::SeqCst);
        if let Err(e) = result {
            // The worker never dies silently: any unmapped failure becomes
            // a terminal media error carrying the correlating ids
            error!(
                "Transfer failed for session {} with transfer {}: {}",
                self.session_id(),
                self.transfer_id,
                e
            );
            let error = match self.core.direction() {
                Direction::Incoming => FileSharingError::MediaDownloadFailed(e),
                Direction::Outgoing => FileSharingError::MediaUploadFailed(e),
            };
            self.handle_error(error).await;
        }
    }

    async fn run_inner(&self) -> Result<(), String> {
        if self.core.is_interrupted() {
            // Aborted before the worker got to run
            return Ok(());
        }
        match self.core.direction() {
            Direction::Incoming => self.run_terminating().await,
            Direction::Outgoing => self.run_originating().await,
        }
    }

    async fn run_terminating(&self) -> Result<(), String> {
        info!(
            "Initiate HTTP file transfer session {} as terminating",
            self.session_id()
        );
        if self.core.is_accepted() {
            debug!("File transfer invitation marked for auto-accept");
            self.notify(|l| {
                l.on_session_auto_accepted(&self.content, self.file_expiration, self.icon_expiration)
            });
            self.persist_invitation().await;
            let _ = self.set_state(FileTransferState::Accepting);
        } else {
            debug!("File transfer invitation marked for manual accept");
            self.notify(|l| {
                l.on_session_invited(&self.content, self.file_expiration, self.icon_expiration)
            });
            self.persist_invitation().await;

            // Remaining validity of the file on the server
            let delay = self.file_expiration - Utc::now();
            let Ok(delay) = delay.to_std() else {
                debug!("File no more available on server: transfer rejected on timeout");
                self.reject_terminal(TerminationReason::ByTimeout).await;
                return Ok(());
            };
            if delay.is_zero() {
                self.reject_terminal(TerminationReason::ByTimeout).await;
                return Ok(());
            }

            let answer = self.core.gate().wait_answer(delay).await;
            match answer {
                InvitationAnswer::RejectedDecline | InvitationAnswer::RejectedBusy => {
                    debug!("Transfer has been rejected by user");
                    self.reject_terminal(TerminationReason::ByUser).await;
                    return Ok(());
                }
                InvitationAnswer::Timeout => {
                    debug!("Transfer has been rejected on timeout");
                    self.reject_terminal(TerminationReason::ByTimeout).await;
                    return Ok(());
                }
                InvitationAnswer::Canceled => {
                    debug!("Transfer has been rejected by remote");
                    self.reject_terminal(TerminationReason::ByRemote).await;
                    return Ok(());
                }
                InvitationAnswer::RejectedBySystem => {
                    if let Some(reason) = self.core.abort_requested() {
                        self.terminate_aborted(reason).await;
                    } else if self.core.claim_terminal() {
                        // The rejection was already surfaced by the layer
                        // that owns it; terminate silently
                        debug!("Transfer aborted by system");
                        self.set_terminal_state(FileTransferState::Rejected);
                        self.log.remove_resume_entry(&self.transfer_id).await;
                        self.registry.remove(&self.session_id()).await;
                    }
                    return Ok(());
                }
                InvitationAnswer::Accepted => {
                    self.core.set_accepted();
                    let _ = self.set_state(FileTransferState::Accepting);
                    self.notify(|l| l.on_session_accepted());
                }
            }
        }

        self.run_download().await
    }

    async fn persist_invitation(&self) {
        self.log
            .set_file_download_address(&self.transfer_id, &self.remote_url)
            .await;
        if let Some(instance) = &self.remote_instance {
            self.log
                .set_remote_sip_instance(&self.transfer_id, instance)
                .await;
        }
        self.log.add_resume_entry(self.resume_record()).await;
    }

    async fn run_download(&self) -> Result<(), String> {
        let TransferKind::Download(manager) = &self.kind else {
            return Err("Download attempted on an upload session".to_string());
        };

        if self.max_size > 0 && self.content.size > self.max_size {
            self.handle_error(FileSharingError::MediaSizeTooBig).await;
            return Ok(());
        }

        let _ = self.set_state(FileTransferState::Started);
        let dest = std::path::PathBuf::from(&self.content.uri);
        loop {
            if self.core.is_interrupted() {
                return Ok(());
            }
            if let Some(reason) = self.core.abort_requested() {
                self.terminate_aborted(reason).await;
                return Ok(());
            }
            manager.reset();
            let offset = self.current_offset();
            let mut progress = |current: u64, total: u64| {
                self.offset.store(current, Ordering::SeqCst);
                self.notify(|l| l.on_transfer_progress(current, total));
            };
            let outcome = manager
                .download(
                    &self.remote_url,
                    &dest,
                    offset,
                    self.content.size,
                    &mut progress,
                )
                .await;

            match outcome {
                Ok(TransferOutcome::Complete(final_offset)) => {
                    self.offset.store(final_offset, Ordering::SeqCst);
                    self.finish_transferred().await;
                    return Ok(());
                }
                Ok(TransferOutcome::Paused(paused_offset)) => {
                    self.offset.store(paused_offset, Ordering::SeqCst);
                    self.log
                        .set_resume_offset(&self.transfer_id, paused_offset)
                        .await;
                    if !self.park_until_resumed().await {
                        return Ok(());
                    }
                }
                Ok(TransferOutcome::Aborted(reached)) => {
                    self.offset.store(reached, Ordering::SeqCst);
                    let reason = self
                        .core
                        .abort_requested()
                        .unwrap_or(TerminationReason::BySystem);
                    self.terminate_aborted(reason).await;
                    return Ok(());
                }
                Err(e) => {
                    self.handle_error(map_download_error(e)).await;
                    return Ok(());
                }
            }
        }
    }

    async fn run_originating(&self) -> Result<(), String> {
        info!(
            "Initiate HTTP file transfer session {} as originating",
            self.session_id()
        );
        let TransferKind::Upload(manager) = &self.kind else {
            return Err("Upload attempted on a download session".to_string());
        };

        if self.max_size > 0 && self.content.size > self.max_size {
            self.handle_error(FileSharingError::MediaSizeTooBig).await;
            return Ok(());
        }

        self.log.add_resume_entry(self.resume_record()).await;
        let _ = self.set_state(FileTransferState::Started);
        let src = std::path::PathBuf::from(&self.content.uri);
        loop {
            if self.core.is_interrupted() {
                return Ok(());
            }
            if let Some(reason) = self.core.abort_requested() {
                self.terminate_aborted(reason).await;
                return Ok(());
            }
            manager.reset();
            let offset = self.current_offset();
            let mut progress = |current: u64, total: u64| {
                self.offset.store(current, Ordering::SeqCst);
                self.notify(|l| l.on_transfer_progress(current, total));
            };
            let outcome = manager
                .upload(&self.remote_url, &src, offset, &mut progress)
                .await;

            match outcome {
                Ok(TransferOutcome::Complete(final_offset)) => {
                    self.offset.store(final_offset, Ordering::SeqCst);
                    self.finish_transferred().await;
                    return Ok(());
                }
                Ok(TransferOutcome::Paused(paused_offset)) => {
                    self.offset.store(paused_offset, Ordering::SeqCst);
                    self.log
                        .set_resume_offset(&self.transfer_id, paused_offset)
                        .await;
                    if !self.park_until_resumed().await {
                        return Ok(());
                    }
                }
                Ok(TransferOutcome::Aborted(reached)) => {
                    self.offset.store(reached, Ordering::SeqCst);
                    let reason = self
                        .core
                        .abort_requested()
                        .unwrap_or(TerminationReason::BySystem);
                    self.terminate_aborted(reason).await;
                    return Ok(());
                }
                Err(e) => {
                    self.handle_error(FileSharingError::MediaUploadFailed(e.to_string()))
                        .await;
                    return Ok(());
                }
            }
        }
    }

    /// Park a paused worker until resume or abort.
    ///
    /// Returns true to continue the transfer loop; false when the worker
    /// should exit (abort, or system pause awaiting reconstruction).
    async fn park_until_resumed(&self) -> bool {
        loop {
            match self.state() {
                FileTransferState::Paused(PauseReason::BySystem) => {
                    // Resumable only by rebuilding from the persisted record
                    debug!(
                        "Transfer {} parked by system; worker exits",
                        self.transfer_id
                    );
                    return false;
                }
                FileTransferState::Started => return true,
                _ => {}
            }
            if self.core.abort_requested().is_some() || self.core.is_interrupted() {
                let reason = self
                    .core
                    .abort_requested()
                    .unwrap_or(TerminationReason::ByUser);
                self.terminate_aborted(reason).await;
                return false;
            }
            self.resume_notify.notified().await;
        }
    }

    async fn finish_transferred(&self) {
        if !self.core.claim_terminal() {
            return;
        }
        info!(
            "Transfer {} completed ({} bytes)",
            self.transfer_id,
            self.current_offset()
        );
        self.set_terminal_state(FileTransferState::Transferred);
        self.log.remove_resume_entry(&self.transfer_id).await;
        self.registry.remove(&self.session_id()).await;
        self.notify(|l| {
            l.on_file_transferred(&self.content, self.file_expiration, self.icon_expiration)
        });
    }
}

/// ENOSPC maps to the storage error, everything else local stays a saving
/// failure and network faults stay download failures
fn map_download_error(error: HttpTransferError) -> FileSharingError {
    match error {
        HttpTransferError::Io(e) => {
            if e.raw_os_error() == Some(28) {
                FileSharingError::NotEnoughStorageSpace
            } else {
                FileSharingError::MediaSavingFailed(e.to_string())
            }
        }
        HttpTransferError::Network(e) => FileSharingError::MediaDownloadFailed(e),
        HttpTransferError::Status(code) => {
            FileSharingError::MediaDownloadFailed(format!("HTTP {}", code))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::InMemoryMessagingLog;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<String>>,
    }

    impl RecordingListener {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: impl Into<String>) {
            self.events.lock().unwrap().push(event.into());
        }
    }

    impl FileTransferListener for RecordingListener {
        fn on_session_invited(
            &self,
            _content: &ContentDescriptor,
            _file_expiration: DateTime<Utc>,
            _icon_expiration: Option<DateTime<Utc>>,
        ) {
            self.push("invited");
        }

        fn on_session_auto_accepted(
            &self,
            _content: &ContentDescriptor,
            _file_expiration: DateTime<Utc>,
            _icon_expiration: Option<DateTime<Utc>>,
        ) {
            self.push("auto_accepted");
        }

        fn on_session_accepted(&self) {
            self.push("accepted");
        }

        fn on_session_rejected(&self, reason: TerminationReason) {
            self.push(format!("rejected:{:?}", reason));
        }

        fn on_session_aborted(&self, reason: TerminationReason) {
            self.push(format!("aborted:{:?}", reason));
        }

        fn on_transfer_progress(&self, current: u64, _total: u64) {
            self.push(format!("progress:{}", current));
        }

        fn on_file_transferred(
            &self,
            _content: &ContentDescriptor,
            _file_expiration: DateTime<Utc>,
            _icon_expiration: Option<DateTime<Utc>>,
        ) {
            self.push("transferred");
        }

        fn on_transfer_paused(&self, reason: PauseReason) {
            self.push(format!("paused:{:?}", reason));
        }

        fn on_transfer_resumed(&self) {
            self.push("resumed");
        }

        fn on_transfer_error(&self, error: &FileSharingError) {
            self.push(format!("error:{}", error));
        }
    }

    fn settings() -> FileTransferConfig {
        FileTransferConfig {
            warn_size: 0,
            max_size: 0,
            auto_accept: false,
            auto_accept_in_roaming: false,
            max_sessions: 10,
            max_concurrent_outgoing: 5,
        }
    }

    fn invite_session(
        settings: &FileTransferConfig,
        file_expiration: DateTime<Utc>,
    ) -> (Arc<HttpFileTransferSession>, Arc<RecordingListener>) {
        let download =
            Arc::new(HttpDownloadManager::new(Duration::from_secs(5)).unwrap());
        let log = Arc::new(InMemoryMessagingLog::new());
        let registry = Arc::new(TransferRegistry::new());
        let session = Arc::new(HttpFileTransferSession::download_from_invite(
            TransferId::from_string("ft-test"),
            ContactId::parse("+33612345678").unwrap(),
            ContentDescriptor::new("/tmp/chitchat-test.bin", "application/octet-stream", 1024, "f.bin"),
            "https://ft.example.com/dl/1",
            None,
            file_expiration,
            None,
            None,
            None,
            settings,
            false,
            download,
            log,
            registry,
        ));
        let listener = Arc::new(RecordingListener::default());
        session.add_listener(listener.clone());
        (session, listener)
    }

    #[test]
    fn test_auto_accept_latched_at_construction() {
        let mut cfg = settings();
        cfg.auto_accept = true;
        let (session, _) = invite_session(&cfg, Utc::now() + chrono::Duration::hours(1));
        assert!(session.is_accepted());

        let cfg = settings();
        let (session, _) = invite_session(&cfg, Utc::now() + chrono::Duration::hours(1));
        assert!(!session.is_accepted());
    }

    #[tokio::test]
    async fn test_expired_invitation_rejected_on_timeout() {
        let cfg = settings();
        let (session, listener) =
            invite_session(&cfg, Utc::now() - chrono::Duration::milliseconds(1));
        session.clone().run().await;

        let events = listener.events();
        // Invitation surfaced, but the manual-accept wait never ran
        assert_eq!(events, vec!["invited", "rejected:ByTimeout"]);
        assert_eq!(session.state(), FileTransferState::Rejected);
    }

    #[tokio::test]
    async fn test_declined_invitation() {
        let cfg = settings();
        let (session, listener) =
            invite_session(&cfg, Utc::now() + chrono::Duration::hours(1));

        let worker = tokio::spawn(session.clone().run());
        tokio::task::yield_now().await;
        session.reject_invitation().unwrap();
        worker.await.unwrap();

        let events = listener.events();
        assert_eq!(events, vec!["invited", "rejected:ByUser"]);
        // A second answer is a policy violation
        assert!(session.accept_invitation().is_err());
    }

    #[tokio::test]
    async fn test_pause_requires_started() {
        let cfg = settings();
        let (session, _) = invite_session(&cfg, Utc::now() + chrono::Duration::hours(1));
        let result = session.pause_file_transfer().await;
        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_resume_requires_user_pause() {
        let cfg = settings();
        let (session, _) = invite_session(&cfg, Utc::now() + chrono::Duration::hours(1));
        assert!(matches!(
            session.resume_file_transfer(),
            Err(DomainError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_abort_before_answer_is_single_terminal() {
        let cfg = settings();
        let (session, listener) =
            invite_session(&cfg, Utc::now() + chrono::Duration::hours(1));

        let worker = tokio::spawn(session.clone().run());
        tokio::task::yield_now().await;
        session.abort_transfer().await.unwrap();
        worker.await.unwrap();

        let events = listener.events();
        let terminals = events
            .iter()
            .filter(|e| e.starts_with("aborted") || e.starts_with("rejected") || e.starts_with("error"))
            .count();
        assert_eq!(terminals, 1);
        assert!(events.contains(&"aborted:ByUser".to_string()));
        // A second abort is rejected
        assert!(session.abort_transfer().await.is_err());
    }

    #[test]
    fn test_map_download_error() {
        let enospc = std::io::Error::from_raw_os_error(28);
        assert!(matches!(
            map_download_error(HttpTransferError::Io(enospc)),
            FileSharingError::NotEnoughStorageSpace
        ));
        assert!(matches!(
            map_download_error(HttpTransferError::Status(404)),
            FileSharingError::MediaDownloadFailed(_)
        ));
    }
}
