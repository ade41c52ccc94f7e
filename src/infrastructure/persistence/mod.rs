//! Persistence ports and in-memory implementations
//!
//! SQL-backed stores live behind these traits in a full deployment; the
//! in-memory variants back the tests and the demo binary.

pub mod contact_repository;
pub mod transfer_log;

pub use contact_repository::{ContactRepository, InMemoryContactRepository};
pub use transfer_log::{InMemoryMessagingLog, MessagingLog, QueuedMessage};
