//! chitchat - an RCS/IMS session engine
//!
//! SIP-signalled content sharing (image, video), resumable HTTP file
//! transfer and OPTIONS capability discovery, built around one worker task
//! per session and exactly one terminal notification per session.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
