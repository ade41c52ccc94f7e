//! Content sharing session lifecycle tests
//!
//! Drive the terminating video flow end to end against a scripted SIP
//! transport and check the listener notification sequences.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chitchat::application::richcall::RichcallService;
use chitchat::application::session::content_sharing::VideoRenderer;
use chitchat::application::session::ContentSharingListener;
use chitchat::config::Config;
use chitchat::domain::session::{ContentSharingError, TerminationReason};
use chitchat::domain::shared::value_objects::ContentDescriptor;
use chitchat::infrastructure::protocols::sip::codec::VideoCodec;
use chitchat::infrastructure::protocols::sip::{
    ScriptedSipTransport, SipRequest, TransactionContext,
};

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
}

impl ContentSharingListener for RecordingListener {
    fn on_session_invited(&self, _content: &ContentDescriptor) {
        self.push("invited");
    }

    fn on_session_accepted(&self) {
        self.push("accepted");
    }

    fn on_session_started(&self) {
        self.push("started");
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

    fn on_content_transferred(&self, _content: &ContentDescriptor) {
        self.push("transferred");
    }

    fn on_sharing_error(&self, error: &ContentSharingError) {
        self.push(format!("error:{:?}", error.reason().1));
    }
}

struct FakeRenderer {
    codecs: Vec<VideoCodec>,
    remote: Mutex<Option<(VideoCodec, String, u16)>>,
}

impl FakeRenderer {
    fn h264() -> Self {
        Self {
            codecs: vec![VideoCodec::new(100, "H264", 90000)],
            remote: Mutex::new(None),
        }
    }
}

impl VideoRenderer for FakeRenderer {
    fn supported_codecs(&self) -> Vec<VideoCodec> {
        self.codecs.clone()
    }

    fn set_remote_info(&self, codec: &VideoCodec, remote_host: &str, remote_port: u16) {
        *self.remote.lock().unwrap() =
            Some((codec.clone(), remote_host.to_string(), remote_port));
    }

    fn start(&self) {}

    fn stop(&self) {}
}

fn video_invite(codec_lines: &str, formats: &str) -> SipRequest {
    let sdp = format!(
        "v=0\r\no=remote 1 1 IN IP4 10.0.0.2\r\ns=-\r\nc=IN IP4 10.0.0.2\r\nt=0 0\r\n\
         m=video 5070 RTP/AVP {}\r\n{}a=sendonly\r\n",
        formats, codec_lines
    );
    let raw = format!(
        "INVITE sip:user@operator.com SIP/2.0\r\n\
         Via: SIP/2.0/UDP 10.0.0.2:5060;branch=z9hG4bKvs1\r\n\
         From: <sip:+33699887766@operator.com>;tag=77\r\n\
         To: <sip:user@operator.com>\r\n\
         Call-ID: cid-vs@remote\r\n\
         CSeq: 1 INVITE\r\n\
         Contact: <sip:+33699887766@10.0.0.2>;+g.3gpp.cs-voice\r\n\
         P-Asserted-Identity: <sip:+33699887766@operator.com>\r\n\
         Content-Type: application/sdp\r\n\
         Content-Length: {}\r\n\r\n{}",
        sdp.len(),
        sdp
    );
    SipRequest::parse(raw.as_bytes()).unwrap()
}

fn live_video_content() -> ContentDescriptor {
    ContentDescriptor::new("", "video/h264", 0, "live-video")
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
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

#[tokio::test]
async fn test_terminating_video_session_established() {
    let transport = Arc::new(ScriptedSipTransport::new());
    // The 200 OK is answered with an ACK
    transport.push_context(TransactionContext::ack());

    let service = RichcallService::new(&Config::default(), transport.clone());
    let listener = Arc::new(RecordingListener::default());
    let renderer = Arc::new(FakeRenderer::h264());

    let invite = video_invite("a=rtpmap:96 H264/90000\r\n", "96");
    let id = service
        .receive_video_sharing_invite(
            invite,
            live_video_content(),
            renderer.clone(),
            listener.clone(),
        )
        .await
        .unwrap();

    wait_for(|| !transport.sent_responses().is_empty()).await;
    service.accept_invitation(&id).await.unwrap();
    wait_for(|| listener.events().contains(&"started".to_string())).await;

    let events = listener.events();
    assert_eq!(events, vec!["invited", "accepted", "started"]);

    // 180 Ringing then 200 OK went out
    let responses = transport.sent_responses();
    assert_eq!(responses[0].status_code(), 180);
    assert_eq!(responses[1].status_code(), 200);
    assert!(responses[1].body_string().contains("H264/90000"));

    // Renderer got the negotiated remote endpoint
    let remote = renderer.remote.lock().unwrap().clone().unwrap();
    assert_eq!(remote.0.payload_type, 96);
    assert_eq!(remote.1, "10.0.0.2");
    assert_eq!(remote.2, 5070);

    // Established sessions stay registered until terminated
    assert!(service.session(&id).await.is_some());

    // Abort tears the session down with a single terminal notification
    service.abort_session(&id).await.unwrap();
    wait_for(|| listener.terminal_count() == 1).await;
    assert!(listener
        .events()
        .contains(&"aborted:ByUser".to_string()));
    assert!(service.session(&id).await.is_none());
}

#[tokio::test]
async fn test_no_common_codec_sends_415() {
    let transport = Arc::new(ScriptedSipTransport::new());
    let service = RichcallService::new(&Config::default(), transport.clone());
    let listener = Arc::new(RecordingListener::default());
    let renderer = Arc::new(FakeRenderer::h264());

    // Remote proposes H263 only
    let invite = video_invite("a=rtpmap:97 H263-2000/90000\r\n", "97");
    let id = service
        .receive_video_sharing_invite(invite, live_video_content(), renderer, listener.clone())
        .await
        .unwrap();

    wait_for(|| !transport.sent_responses().is_empty()).await;
    service.accept_invitation(&id).await.unwrap();
    wait_for(|| listener.terminal_count() == 1).await;

    let events = listener.events();
    assert!(events.contains(&"error:UnsupportedMediaType".to_string()));

    // 415 went out and the registry entry is gone
    let responses = transport.sent_responses();
    assert!(responses.iter().any(|r| r.status_code() == 415));
    assert!(service.session(&id).await.is_none());
}

#[tokio::test]
async fn test_no_ack_fails_session() {
    let transport = Arc::new(ScriptedSipTransport::new());
    // Script a timeout instead of the ACK
    transport.push_context(TransactionContext::no_response());

    let service = RichcallService::new(&Config::default(), transport.clone());
    let listener = Arc::new(RecordingListener::default());
    let renderer = Arc::new(FakeRenderer::h264());

    let invite = video_invite("a=rtpmap:96 H264/90000\r\n", "96");
    let id = service
        .receive_video_sharing_invite(invite, live_video_content(), renderer, listener.clone())
        .await
        .unwrap();

    wait_for(|| !transport.sent_responses().is_empty()).await;
    service.accept_invitation(&id).await.unwrap();
    wait_for(|| listener.terminal_count() == 1).await;

    assert!(listener
        .events()
        .contains(&"error:InitiationFailed".to_string()));
    assert!(service.session(&id).await.is_none());
}

#[tokio::test]
async fn test_remote_cancel_rejects_session() {
    let transport = Arc::new(ScriptedSipTransport::new());
    let service = RichcallService::new(&Config::default(), transport.clone());
    let listener = Arc::new(RecordingListener::default());
    let renderer = Arc::new(FakeRenderer::h264());

    let invite = video_invite("a=rtpmap:96 H264/90000\r\n", "96");
    let id = service
        .receive_video_sharing_invite(invite, live_video_content(), renderer, listener.clone())
        .await
        .unwrap();

    wait_for(|| !transport.sent_responses().is_empty()).await;
    service.receive_cancel(&id).await;
    wait_for(|| listener.terminal_count() == 1).await;

    assert!(listener
        .events()
        .contains(&"rejected:ByRemote".to_string()));
    assert!(service.session(&id).await.is_none());

    // Answering after the cancel is a policy violation
    assert!(service.accept_invitation(&id).await.is_err());
}
