//! reel-core: shared error kinds and configuration for the reel media server.

pub mod config;
pub mod errors;

pub use config::{ReelConfig, ReelConfigSnapshot};
pub use errors::{ErrorKind, ReelError};
