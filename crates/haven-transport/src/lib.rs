//! Haven Realtime Transport
//!
//! A transport owns the wire. It opens one bidirectional channel per identity,
//! keeps it alive (reconnecting with backoff when the socket drops), and
//! reports what happened through a [`TransportEvent`] stream:
//!
//! ```text
//! open ──► Connected ──► Server(..)* ──► Dropped ──► Connected ──► ...
//!                                           │
//!                                  retries exhausted
//!                                           ▼
//!                                        Closed
//! ```
//!
//! The session manager never reconnects by itself; it reacts to `Connected`
//! (replay room joins) and `Closed` (tear the connection down).

mod error;
mod memory;
mod ws;

pub use error::TransportError;
pub use memory::MemoryTransport;
pub use ws::WsTransport;

use haven_protocol::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;

pub type Result<T> = std::result::Result<T, TransportError>;

/// What a transport reports back to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is (again) established.
    Connected,
    /// The channel dropped; the transport is retrying.
    Dropped { reason: String },
    /// The transport gave up. No further events follow.
    Closed { reason: String },
    /// A validated server frame.
    Server(ServerEvent),
}

pub type EventSink = mpsc::UnboundedSender<TransportEvent>;
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

/// Opens realtime connections.
pub trait Transport: Send + Sync {
    /// Start connecting on behalf of `identity`. Returns immediately; progress
    /// is reported through `events`.
    fn open(&self, identity: &str, events: EventSink) -> Result<Box<dyn Connection>>;
}

/// Handle to one open realtime channel.
pub trait Connection: Send + Sync {
    /// Queue an outbound event.
    fn emit(&self, event: ClientEvent) -> Result<()>;

    /// Tear the channel down. Idempotent.
    fn close(&self);
}
