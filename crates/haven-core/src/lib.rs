//! Haven Core
//!
//! Application-level entry point for the realtime chat of the Haven
//! marketplace. A [`ChatClient`] is built on sign-in and consumed on sign-out;
//! everything realtime hangs off the [`SessionManager`] it owns.

mod client;
mod config;
mod error;
mod session;

pub use client::ChatClient;
pub use config::{Config, PollConfig};
pub use error::CoreError;
pub use session::Session;

// Re-export the realtime surface
pub use haven_backend::{Backend, BackendError, HttpBackend};
pub use haven_protocol::{
    room_id, ChatMessage, ClientEvent, OutgoingMessage, RetryPolicy, RoomSummary, ServerEvent,
    TypingIndicator,
};
pub use haven_realtime::{
    ChatFocus, ConnectionState, ConversationTarget, Handler, LogNotifier, MessageNotice,
    Navigator, NoopNavigator, Notifier, RealtimeError, SessionManager, Subscription,
};
pub use haven_transport::{MemoryTransport, Transport, TransportError, WsTransport};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
