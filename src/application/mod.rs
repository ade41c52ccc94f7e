//! Application layer - Services orchestrating sessions and probes
//!
//! This layer owns the session registries, spawns one worker task per
//! session and exposes the operations the public API layer calls.

pub mod capability;
pub mod dequeue;
pub mod filetransfer;
pub mod richcall;
pub mod session;

pub use capability::{CapabilityListener, CapabilityService};
pub use dequeue::{ChatDispatcher, ChatSessionStatus, DequeueTask};
pub use filetransfer::{FileTransferInvite, FileTransferService};
pub use richcall::RichcallService;
