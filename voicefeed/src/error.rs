//! Error types for VoiceFeed

use crate::world::SessionId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoiceFeedError {
    /// A backend primitive reported a driver or hardware error.
    #[error("Backend call failed: {0}")]
    BackendCallFailed(String),

    /// No free voice was left in the pool.
    #[error("Voice pool exhausted: all {0} voices are in use")]
    PoolExhausted(usize),

    #[error("Invalid stream state: {0}")]
    InvalidStreamState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
}

impl VoiceFeedError {
    /// Shorthand used by backends to tag a failed call with its name.
    pub fn backend(call: &str, reason: impl std::fmt::Display) -> Self {
        Self::BackendCallFailed(format!("{}: {}", call, reason))
    }
}

pub type Result<T> = std::result::Result<T, VoiceFeedError>;
