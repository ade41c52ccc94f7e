//! SIP transport seam
//!
//! The stack behind this trait owns retransmission, transaction matching and
//! the wire format. Sessions only see blocking send-and-wait semantics and
//! the resulting transaction context.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::message::{SipError, SipRequest, SipResponse};

/// Outcome of one SIP transaction
#[derive(Debug, Clone)]
pub struct TransactionContext {
    pub status_code: u16,
    pub reason_phrase: String,
    pub response: Option<SipResponse>,
    pub ack_received: bool,
}

impl TransactionContext {
    pub fn from_response(response: SipResponse) -> Self {
        Self {
            status_code: response.status_code(),
            reason_phrase: String::new(),
            response: Some(response),
            ack_received: false,
        }
    }

    /// Context for an ACK received instead of a response
    pub fn ack() -> Self {
        Self {
            status_code: 0,
            reason_phrase: String::new(),
            response: None,
            ack_received: true,
        }
    }

    /// Context for a transaction that timed out without any response
    pub fn no_response() -> Self {
        Self {
            status_code: 0,
            reason_phrase: "timeout".to_string(),
            response: None,
            ack_received: false,
        }
    }

    pub fn is_sip_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn is_sip_ack(&self) -> bool {
        self.ack_received
    }
}

/// IMS network attachment state
pub trait ImsLink: Send + Sync {
    /// Whether the client is registered with the IMS network
    fn is_registered(&self) -> bool;

    /// Whether the device is on a roaming network
    fn is_roaming(&self) -> bool;

    /// Whether data connectivity is available
    fn is_connected(&self) -> bool;
}

/// Blocking SIP transaction primitives
#[async_trait]
pub trait SipTransport: Send + Sync {
    /// Send a request and wait for its final response (or timeout)
    async fn send_request_and_wait(
        &self,
        request: SipRequest,
    ) -> Result<TransactionContext, SipError>;

    /// Send a response without waiting
    async fn send_response(&self, response: SipResponse) -> Result<(), SipError>;

    /// Send a final INVITE response and wait for the ACK (or timeout)
    async fn send_response_and_wait_ack(
        &self,
        response: SipResponse,
    ) -> Result<TransactionContext, SipError>;
}

/// Transport handing out canned transaction outcomes.
///
/// Used by the integration tests and the demo binary; a production build
/// plugs a real SIP stack behind the same traits.
#[derive(Default)]
pub struct ScriptedSipTransport {
    contexts: Mutex<VecDeque<TransactionContext>>,
    sent_requests: Mutex<Vec<SipRequest>>,
    sent_responses: Mutex<Vec<SipResponse>>,
    registered: AtomicBool,
    roaming: AtomicBool,
    connected: AtomicBool,
}

impl ScriptedSipTransport {
    pub fn new() -> Self {
        let transport = Self::default();
        transport.registered.store(true, Ordering::SeqCst);
        transport.connected.store(true, Ordering::SeqCst);
        transport
    }

    /// Queue the outcome of the next transaction
    pub fn push_context(&self, context: TransactionContext) {
        self.contexts.lock().unwrap().push_back(context);
    }

    pub fn sent_requests(&self) -> Vec<SipRequest> {
        self.sent_requests.lock().unwrap().clone()
    }

    pub fn sent_responses(&self) -> Vec<SipResponse> {
        self.sent_responses.lock().unwrap().clone()
    }

    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }

    pub fn set_roaming(&self, roaming: bool) {
        self.roaming.store(roaming, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl ImsLink for ScriptedSipTransport {
    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    fn is_roaming(&self) -> bool {
        self.roaming.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SipTransport for ScriptedSipTransport {
    async fn send_request_and_wait(
        &self,
        request: SipRequest,
    ) -> Result<TransactionContext, SipError> {
        self.sent_requests.lock().unwrap().push(request);
        let next = self.contexts.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(TransactionContext::no_response))
    }

    async fn send_response(&self, response: SipResponse) -> Result<(), SipError> {
        self.sent_responses.lock().unwrap().push(response);
        Ok(())
    }

    async fn send_response_and_wait_ack(
        &self,
        response: SipResponse,
    ) -> Result<TransactionContext, SipError> {
        self.sent_responses.lock().unwrap().push(response);
        let next = self.contexts.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(TransactionContext::no_response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_kinds() {
        let ack = TransactionContext::ack();
        assert!(ack.is_sip_ack());
        assert!(!ack.is_sip_response());

        let none = TransactionContext::no_response();
        assert!(!none.is_sip_ack());
        assert!(!none.is_sip_response());
        assert_eq!(none.status_code, 0);
    }

    #[tokio::test]
    async fn test_scripted_transport_pops_in_order() {
        let transport = ScriptedSipTransport::new();
        let ok = SipResponse::parse(
            b"SIP/2.0 200 OK\r\n\
              Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKa\r\n\
              From: <sip:a@x>;tag=1\r\n\
              To: <sip:b@x>;tag=2\r\n\
              Call-ID: cid\r\n\
              CSeq: 1 OPTIONS\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();
        transport.push_context(TransactionContext::from_response(ok));

        let request = SipRequest::parse(
            b"OPTIONS sip:b@x SIP/2.0\r\n\
              Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKb\r\n\
              From: <sip:a@x>;tag=1\r\n\
              To: <sip:b@x>\r\n\
              Call-ID: cid\r\n\
              CSeq: 1 OPTIONS\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();

        let ctx = transport.send_request_and_wait(request).await.unwrap();
        assert_eq!(ctx.status_code, 200);

        // Exhausted script falls back to a timeout
        let request2 = SipRequest::parse(
            b"OPTIONS sip:b@x SIP/2.0\r\n\
              Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKc\r\n\
              From: <sip:a@x>;tag=1\r\n\
              To: <sip:b@x>\r\n\
              Call-ID: cid\r\n\
              CSeq: 2 OPTIONS\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();
        let ctx = transport.send_request_and_wait(request2).await.unwrap();
        assert!(!ctx.is_sip_response());
        assert_eq!(transport.sent_requests().len(), 2);
    }
}
