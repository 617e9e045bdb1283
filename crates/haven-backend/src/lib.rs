//! Haven Backend Client
//!
//! The REST backend is the source of truth for unread counts and room
//! listings. Everything here is a thin, bearer-authenticated `GET`.

mod error;
mod http;

pub use error::BackendError;
pub use http::HttpBackend;

use async_trait::async_trait;
use haven_protocol::RoomSummary;

pub type Result<T> = std::result::Result<T, BackendError>;

/// Chat endpoints of the marketplace backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Authoritative unread-message count for `user_id`.
    async fn unread_count(&self, user_id: &str) -> Result<u64>;

    /// Conversation rooms `user_id` takes part in.
    async fn chat_rooms(&self, user_id: &str) -> Result<Vec<RoomSummary>>;
}
