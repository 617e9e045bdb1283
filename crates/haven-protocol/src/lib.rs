//! Haven Realtime Protocol
//!
//! Wire types exchanged with the realtime service and the REST backend.
//!
//! Every realtime frame is a JSON text frame shaped as
//! `{"event": <name>, "data": <payload>}`:
//!
//! - **Client events** (app → realtime service): join/leave a room, send a
//!   message, publish a typing indicator
//! - **Server events** (realtime service → app): an incoming message, a typing
//!   indicator, an error report
//!
//! Inbound frames are validated on decode. A frame that is missing a required
//! field, or carries an empty identifier, never reaches a subscriber.

mod error;
mod event;
mod message;
mod retry;
mod room;

pub use error::ProtocolError;
pub use event::{ClientEvent, ServerEvent};
pub use message::{ChatMessage, OutgoingMessage, RoomSummary, TypingIndicator};
pub use retry::RetryPolicy;
pub use room::{room_id, ROOM_ID_SEPARATOR};

pub type Result<T> = std::result::Result<T, ProtocolError>;
