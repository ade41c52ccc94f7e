//! SIP dialog path
//!
//! Addressing and sequence state of one SIP signalling exchange. Owned
//! exclusively by the session driving the dialog.

use rand::Rng;
use uuid::Uuid;

use super::message::{SipError, SipRequest};

/// Generate a call-id unique within this client
pub fn generate_call_id(local_host: &str) -> String {
    format!("{}@{}", Uuid::new_v4().as_simple(), local_host)
}

/// Generate a dialog tag
pub fn generate_tag() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..6).map(|_| rng.gen()).collect();
    hex::encode(random_bytes)
}

/// Generate a Via branch parameter
pub fn generate_branch() -> String {
    let mut rng = rand::thread_rng();
    let random: u64 = rng.gen();
    format!("z9hG4bK{:x}", random)
}

/// One SIP dialog's addressing and sequence state
#[derive(Debug)]
pub struct DialogPath {
    /// Immutable after creation
    call_id: String,
    /// Local sequence number, monotonically non-decreasing
    cseq: u32,
    /// Local party URI (From on outgoing requests)
    local_party: String,
    /// Remote party URI (To on outgoing requests)
    remote_party: String,
    /// Request target
    target: String,
    local_tag: String,
    /// Initial INVITE for terminating dialogs
    invite: Option<SipRequest>,
    local_content: Option<String>,
    remote_content: Option<String>,
    /// 200 OK sent or received
    sig_established: bool,
    /// ACK exchanged, dialog confirmed
    session_established: bool,
    terminated: bool,
}

impl DialogPath {
    /// Dialog for a locally initiated exchange
    pub fn originating(
        call_id: impl Into<String>,
        local_party: impl Into<String>,
        remote_party: impl Into<String>,
    ) -> Self {
        let remote_party = remote_party.into();
        Self {
            call_id: call_id.into(),
            cseq: 1,
            local_party: local_party.into(),
            target: remote_party.clone(),
            remote_party,
            local_tag: generate_tag(),
            invite: None,
            local_content: None,
            remote_content: None,
            sig_established: false,
            session_established: false,
            terminated: false,
        }
    }

    /// Dialog built from a received INVITE
    pub fn terminating(invite: SipRequest, local_party: impl Into<String>) -> Result<Self, SipError> {
        let call_id = invite
            .call_id()
            .ok_or_else(|| SipError::InvalidMessage("INVITE without Call-ID".to_string()))?;
        let cseq = invite
            .cseq()
            .ok_or_else(|| SipError::InvalidMessage("INVITE without CSeq".to_string()))?;
        let remote_party = invite
            .from_value()
            .ok_or_else(|| SipError::InvalidMessage("INVITE without From".to_string()))?;
        let remote_content = {
            let body = invite.body_string();
            if body.is_empty() {
                None
            } else {
                Some(body)
            }
        };

        Ok(Self {
            call_id,
            cseq,
            local_party: local_party.into(),
            target: remote_party.clone(),
            remote_party,
            local_tag: generate_tag(),
            invite: Some(invite),
            local_content: None,
            remote_content,
            sig_established: false,
            session_established: false,
            terminated: false,
        })
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    /// Advance the local sequence number; used once per authenticated retry
    pub fn increment_cseq(&mut self) {
        self.cseq += 1;
    }

    pub fn local_party(&self) -> &str {
        &self.local_party
    }

    pub fn remote_party(&self) -> &str {
        &self.remote_party
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn local_tag(&self) -> &str {
        &self.local_tag
    }

    pub fn invite(&self) -> Option<&SipRequest> {
        self.invite.as_ref()
    }

    pub fn local_content(&self) -> Option<&str> {
        self.local_content.as_deref()
    }

    pub fn set_local_content(&mut self, sdp: impl Into<String>) {
        self.local_content = Some(sdp.into());
    }

    pub fn remote_content(&self) -> Option<&str> {
        self.remote_content.as_deref()
    }

    pub fn set_remote_content(&mut self, sdp: impl Into<String>) {
        self.remote_content = Some(sdp.into());
    }

    pub fn is_sig_established(&self) -> bool {
        self.sig_established
    }

    /// Mark the 200 OK as sent or received
    pub fn sig_established(&mut self) {
        self.sig_established = true;
    }

    pub fn is_session_established(&self) -> bool {
        self.session_established
    }

    /// Mark the ACK as exchanged
    pub fn session_established(&mut self) {
        self.sig_established = true;
        self.session_established = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Close the dialog; no further requests may be built on this path
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    /// Guard used by the message factory before building a request
    pub fn check_open(&self) -> Result<(), SipError> {
        if self.terminated {
            Err(SipError::DialogTerminated)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming_invite() -> SipRequest {
        SipRequest::parse(
            b"INVITE sip:+33611223344@operator.com SIP/2.0\r\n\
              Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bKabc\r\n\
              From: <sip:+33699887766@operator.com>;tag=42\r\n\
              To: <sip:+33611223344@operator.com>\r\n\
              Call-ID: cid-123@remote\r\n\
              CSeq: 7 INVITE\r\n\
              Content-Type: application/sdp\r\n\
              Content-Length: 5\r\n\r\nv=0\r\n",
        )
        .unwrap()
    }

    #[test]
    fn test_originating_dialog() {
        let dialog = DialogPath::originating(
            generate_call_id("local.host"),
            "sip:me@operator.com",
            "sip:+33611223344@operator.com",
        );
        assert_eq!(dialog.cseq(), 1);
        assert!(!dialog.is_terminated());
        assert!(dialog.call_id().ends_with("@local.host"));
        assert!(!dialog.local_tag().is_empty());
    }

    #[test]
    fn test_terminating_dialog_from_invite() {
        let dialog = DialogPath::terminating(incoming_invite(), "sip:me@operator.com").unwrap();
        assert_eq!(dialog.call_id(), "cid-123@remote");
        assert_eq!(dialog.cseq(), 7);
        assert_eq!(dialog.remote_content(), Some("v=0\r\n"));
        assert!(dialog.invite().is_some());
    }

    #[test]
    fn test_cseq_increment() {
        let mut dialog = DialogPath::originating("cid@h", "sip:a@x", "sip:b@x");
        dialog.increment_cseq();
        assert_eq!(dialog.cseq(), 2);
    }

    #[test]
    fn test_terminated_dialog_rejects_requests() {
        let mut dialog = DialogPath::originating("cid@h", "sip:a@x", "sip:b@x");
        assert!(dialog.check_open().is_ok());
        dialog.terminate();
        assert!(matches!(
            dialog.check_open(),
            Err(SipError::DialogTerminated)
        ));
    }

    #[test]
    fn test_establishment_flags() {
        let mut dialog = DialogPath::originating("cid@h", "sip:a@x", "sip:b@x");
        assert!(!dialog.is_sig_established());
        dialog.sig_established();
        assert!(dialog.is_sig_established());
        assert!(!dialog.is_session_established());
        dialog.session_established();
        assert!(dialog.is_session_established());
    }
}
