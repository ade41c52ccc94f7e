//! Protocol support (SIP signalling, HTTP content transfer)

pub mod http;
pub mod sip;
