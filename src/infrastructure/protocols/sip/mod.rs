//! SIP protocol support
//!
//! Dialog-path bookkeeping, digest authentication, message construction and
//! the transport seam. The transaction and transport internals live behind
//! the `SipTransport` trait; this module only owns what a session needs to
//! drive its dialog.

pub mod auth;
pub mod codec;
pub mod dialog;
pub mod factory;
pub mod message;
pub mod sdp;
pub mod transport;

pub use auth::{SessionAuthenticationAgent, UserCredentials};
pub use dialog::{generate_call_id, DialogPath};
pub use message::{SipError, SipMethod, SipRequest, SipResponse};
pub use sdp::{SdpDirection, SdpSession};
pub use transport::{ImsLink, ScriptedSipTransport, SipTransport, TransactionContext};
