//! Domain layer - Core business logic and rules
//!
//! This layer contains:
//! - Value Objects: Immutable objects without identity
//! - State machines: Session and transfer lifecycle rules
//! - Policies: Pure decision functions (auto-accept)
//! - Shared kernel: Errors and identifiers

pub mod capability;
pub mod session;
pub mod shared;
pub mod transfer;

// Re-export commonly used types
pub use shared::{DomainError, Result};
