//! HTTP file transfer session tests
//!
//! Runs the transfer sessions against a minimal local HTTP server so the
//! pause/resume and completion paths exercise real byte streams.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chitchat::application::session::FileTransferListener;
use chitchat::application::{FileTransferInvite, FileTransferService};
use chitchat::config::Config;
use chitchat::domain::session::TerminationReason;
use chitchat::domain::shared::value_objects::{ContactId, ContentDescriptor, TransferId};
use chitchat::domain::transfer::{FileSharingError, FileTransferState, PauseReason};
use chitchat::infrastructure::persistence::{InMemoryMessagingLog, MessagingLog};
use chitchat::infrastructure::protocols::sip::ScriptedSipTransport;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn has(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }

    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn terminal_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| {
                e.starts_with("rejected")
                    || e.starts_with("aborted")
                    || e.starts_with("error")
                    || e.starts_with("transferred")
            })
            .count()
    }

    fn max_progress(&self) -> u64 {
        self.events()
            .iter()
            .filter_map(|e| e.strip_prefix("progress:")?.parse().ok())
            .max()
            .unwrap_or(0)
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

/// Minimal HTTP server: GET with Range support (body served in slow
/// pieces), PUT accepting Content-Range slices
struct TestServer {
    addr: SocketAddr,
    range_starts: Arc<Mutex<Vec<u64>>>,
    uploaded: Arc<Mutex<Vec<u8>>>,
}

impl TestServer {
    async fn start(data: Vec<u8>, pieces: usize, piece_delay: Duration) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let range_starts = Arc::new(Mutex::new(Vec::new()));
        let uploaded = Arc::new(Mutex::new(Vec::new()));

        let ranges = range_starts.clone();
        let upload_sink = uploaded.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let data = data.clone();
                let ranges = ranges.clone();
                let upload_sink = upload_sink.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut tmp = [0u8; 4096];
                    let header_end = loop {
                        let n = socket.read(&mut tmp).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&tmp[..n]);
                        if let Some(pos) =
                            buf.windows(4).position(|w| w == b"\r\n\r\n")
                        {
                            break pos + 4;
                        }
                    };
                    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();

                    if head.starts_with("PUT") {
                        let content_length: usize = head
                            .lines()
                            .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(str::to_string))
                            .and_then(|v| v.trim().parse().ok())
                            .unwrap_or(0);
                        let mut body = buf[header_end..].to_vec();
                        while body.len() < content_length {
                            let n = socket.read(&mut tmp).await.unwrap_or(0);
                            if n == 0 {
                                break;
                            }
                            body.extend_from_slice(&tmp[..n]);
                        }
                        upload_sink.lock().unwrap().extend_from_slice(&body);
                        let response =
                            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
                        let _ = socket.write_all(response.as_bytes()).await;
                        return;
                    }

                    // GET path with optional Range
                    let start: u64 = head
                        .lines()
                        .find_map(|l| l.strip_prefix("Range: bytes="))
                        .and_then(|r| r.split('-').next()?.parse().ok())
                        .unwrap_or(0);
                    ranges.lock().unwrap().push(start);
                    let body = &data[start as usize..];
                    let status = if start > 0 { "206 Partial Content" } else { "200 OK" };
                    let header = format!(
                        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    let _ = socket.write_all(header.as_bytes()).await;

                    let piece_size = body.len().div_ceil(pieces).max(1);
                    for piece in body.chunks(piece_size) {
                        if socket.write_all(piece).await.is_err() {
                            return;
                        }
                        let _ = socket.flush().await;
                        tokio::time::sleep(piece_delay).await;
                    }
                });
            }
        });

        Self {
            addr,
            range_starts,
            uploaded,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path)
    }
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn service(auto_accept: bool) -> (FileTransferService, Arc<InMemoryMessagingLog>) {
    let mut config = Config::default();
    config.file_transfer.auto_accept = auto_accept;
    let link = Arc::new(ScriptedSipTransport::new());
    let log = Arc::new(InMemoryMessagingLog::new());
    (
        FileTransferService::new(&config, link, log.clone()),
        log,
    )
}

fn invite(transfer_id: &str, url: String, dest: &std::path::Path, size: u64) -> FileTransferInvite {
    FileTransferInvite {
        transfer_id: TransferId::from_string(transfer_id),
        contact: ContactId::parse("+33612345678").unwrap(),
        content: ContentDescriptor::new(
            dest.to_string_lossy(),
            "application/octet-stream",
            size,
            "payload.bin",
        ),
        download_url: url,
        icon: None,
        file_expiration: Utc::now() + chrono::Duration::hours(1),
        icon_expiration: None,
        remote_instance: Some("<urn:gsma:imei:42>".to_string()),
        chat_id: None,
    }
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_auto_accepted_download_completes() {
    let data = payload(64 * 1024);
    let server = TestServer::start(data.clone(), 4, Duration::from_millis(10)).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("download.bin");

    let (service, log) = service(true);
    let listener = Arc::new(RecordingListener::default());
    let session = service
        .receive_file_transfer_invite(
            invite("ft-dl", server.url("f/1"), &dest, data.len() as u64),
            listener.clone(),
        )
        .await
        .unwrap();

    wait_for(|| listener.has("transferred")).await;

    assert!(listener.has("auto_accepted"));
    assert!(!listener.has("invited"));
    assert_eq!(listener.terminal_count(), 1);
    assert_eq!(session.state(), FileTransferState::Transferred);
    assert_eq!(std::fs::read(&dest).unwrap(), data);

    // Server address and remote instance persisted, resume record cleaned
    // up on completion
    let id = TransferId::from_string("ft-dl");
    assert!(log.download_address(&id).await.is_some());
    assert!(log.remote_sip_instance(&id).await.is_some());
    assert!(log.get_resume_entry(&id).await.is_none());
    assert!(service.session_by_transfer_id(&id).await.is_none());
}

#[tokio::test]
async fn test_pause_resume_continues_from_offset() {
    let data = payload(256 * 1024);
    let server = TestServer::start(data.clone(), 8, Duration::from_millis(40)).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("paused.bin");

    let (service, _log) = service(true);
    let listener = Arc::new(RecordingListener::default());
    let session = service
        .receive_file_transfer_invite(
            invite("ft-pause", server.url("f/2"), &dest, data.len() as u64),
            listener.clone(),
        )
        .await
        .unwrap();

    // Let some bytes flow, then pause
    wait_for(|| listener.max_progress() > 0).await;
    session.pause_file_transfer().await.unwrap();
    assert_eq!(
        session.state(),
        FileTransferState::Paused(PauseReason::ByUser)
    );
    assert!(listener.has("paused:ByUser"));

    // Wait until the worker actually parked at the chunk boundary
    wait_for(|| {
        session.current_offset() > 0 && session.current_offset() < data.len() as u64
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let paused_offset = session.current_offset();
    assert!(paused_offset < data.len() as u64);

    // Resume and let it finish
    session.resume_file_transfer().unwrap();
    assert!(listener.has("resumed"));
    wait_for(|| listener.has("transferred")).await;

    assert_eq!(listener.terminal_count(), 1);
    assert_eq!(std::fs::read(&dest).unwrap(), data);

    // The second request resumed from the acknowledged offset, so no byte
    // was downloaded twice
    let ranges = server.range_starts.lock().unwrap().clone();
    assert_eq!(ranges.len(), 2);
    assert_eq!(ranges[0], 0);
    assert!(ranges[1] >= paused_offset);
    assert!(ranges[1] > 0);
}

#[tokio::test]
async fn test_upload_streams_all_bytes() {
    let data = payload(96 * 1024);
    let server = TestServer::start(Vec::new(), 1, Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("upload.bin");
    std::fs::write(&src, &data).unwrap();

    let mut config = Config::default();
    config.http.server_addr = server.url("upload/1");
    config.http.upload_slice_size = 16 * 1024;
    let link = Arc::new(ScriptedSipTransport::new());
    let log = Arc::new(InMemoryMessagingLog::new());
    let service = FileTransferService::new(&config, link, log);

    let listener = Arc::new(RecordingListener::default());
    let session = service
        .initiate_file_transfer(
            ContactId::parse("+33612345678").unwrap(),
            ContentDescriptor::new(
                src.to_string_lossy(),
                "application/octet-stream",
                data.len() as u64,
                "upload.bin",
            ),
            None,
            listener.clone(),
        )
        .await
        .unwrap();

    wait_for(|| listener.has("transferred")).await;
    assert_eq!(session.state(), FileTransferState::Transferred);
    assert_eq!(listener.terminal_count(), 1);
    assert_eq!(server.uploaded.lock().unwrap().clone(), data);
}

#[tokio::test]
async fn test_manual_accept_flow() {
    let data = payload(8 * 1024);
    let server = TestServer::start(data.clone(), 2, Duration::from_millis(5)).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("manual.bin");

    let (service, _log) = service(false);
    let listener = Arc::new(RecordingListener::default());
    let session = service
        .receive_file_transfer_invite(
            invite("ft-manual", server.url("f/3"), &dest, data.len() as u64),
            listener.clone(),
        )
        .await
        .unwrap();

    wait_for(|| listener.has("invited")).await;
    session.accept_invitation().unwrap();
    wait_for(|| listener.has("transferred")).await;

    let events = listener.events();
    assert_eq!(events[0], "invited");
    assert!(events.contains(&"accepted".to_string()));
    assert_eq!(std::fs::read(&dest).unwrap(), data);
}
