//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Realtime error: {0}")]
    Realtime(#[from] haven_realtime::RealtimeError),

    #[error("Transport error: {0}")]
    Transport(#[from] haven_transport::TransportError),

    #[error("Backend error: {0}")]
    Backend(#[from] haven_backend::BackendError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("User id cannot be empty")]
    EmptyIdentity,

    #[error("Session has no access token")]
    MissingToken,

    #[error("Message text cannot be empty")]
    EmptyMessage,
}
