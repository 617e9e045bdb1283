//! Transport error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid realtime URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported realtime URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("No async runtime available to drive the connection")]
    NoRuntime,

    #[error("Connection closed")]
    Closed,
}
