//! Realtime error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Identity cannot be empty")]
    EmptyIdentity,

    #[error("No async runtime available")]
    NoRuntime,

    #[error("Transport error: {0}")]
    Transport(#[from] haven_transport::TransportError),

    #[error("Backend error: {0}")]
    Backend(#[from] haven_backend::BackendError),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Result arrived after the connection changed")]
    StaleResult,
}
