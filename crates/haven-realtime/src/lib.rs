//! Haven Realtime Session Manager
//!
//! Owns the realtime side of a signed-in session:
//! - One connection per identity, opened explicitly and never resurrected implicitly
//! - Room membership that survives reconnects (joins are replayed on every
//!   "connected" acknowledgment)
//! - A best-effort unread-message counter reconciled against the backend
//! - Ordered, fault-isolated fan-out of incoming messages to subscribers
//!
//! Construct one [`SessionManager`] on sign-in and drop it on sign-out.

mod error;
mod listeners;
mod manager;
mod notify;
mod rooms;
mod state;
mod unread;

pub use error::RealtimeError;
pub use listeners::{Handler, Listeners, Subscription};
pub use manager::SessionManager;
pub use notify::{
    ChatFocus, ConversationTarget, LogNotifier, MessageNotice, Navigator, NoopNavigator, Notifier,
};
pub use rooms::RoomMembership;
pub use state::ConnectionState;
pub use unread::UnreadCounter;

pub type Result<T> = std::result::Result<T, RealtimeError>;
