//! Error types for the showtime service.

use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for showtime operations.
///
/// Only setup-time failures surface here. Steady-state conditions such as a
/// full subscriber inbox or a repeated cancel are absorbed by the service.
#[derive(Debug, Error)]
pub enum ShowtimeError {
    #[error("Failed to parse cue listener address {addr:?}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to listen on UDP port {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start background thread: {0}")]
    Spawn(std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ShowtimeError {
    fn from(e: serde_json::Error) -> Self {
        ShowtimeError::Deserialization(e.to_string())
    }
}

/// Result type for showtime operations.
pub type Result<T> = std::result::Result<T, ShowtimeError>;
