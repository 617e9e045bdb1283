//! In-memory transport
//!
//! Records every outbound event and lets the owner inject inbound ones.
//! Used for offline runs and tests.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use haven_protocol::ClientEvent;

use crate::error::TransportError;
use crate::{Connection, EventSink, Result, Transport, TransportEvent};

#[derive(Default)]
struct MemoryState {
    /// Identities passed to `open`, in order
    opened: Vec<String>,
    /// Outbound events across all connections
    emitted: Vec<ClientEvent>,
    /// Sink of the most recently opened connection
    sink: Option<EventSink>,
    closed: usize,
}

#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities that connections were opened for
    pub fn opened(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }

    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.state.lock().emitted.clone()
    }

    /// Drain recorded outbound events
    pub fn take_emitted(&self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.state.lock().emitted)
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closed
    }

    /// Deliver an event to the latest connection's owner.
    /// Returns false when nothing is listening.
    pub fn push(&self, event: TransportEvent) -> bool {
        match self.state.lock().sink.as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }
}

impl Transport for MemoryTransport {
    fn open(&self, identity: &str, events: EventSink) -> Result<Box<dyn Connection>> {
        let mut state = self.state.lock();
        state.opened.push(identity.to_string());
        state.sink = Some(events);

        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    closed: AtomicBool,
}

impl Connection for MemoryConnection {
    fn emit(&self, event: ClientEvent) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.state.lock().emitted.push(event);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.lock().closed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_records_and_closes() {
        let transport = MemoryTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let connection = transport.open("u1", tx).unwrap();
        connection.emit(ClientEvent::join("r1")).unwrap();
        assert!(transport.push(TransportEvent::Connected));
        assert_eq!(rx.try_recv().unwrap(), TransportEvent::Connected);

        connection.close();
        connection.close();
        assert_eq!(transport.close_count(), 1);
        assert!(connection.emit(ClientEvent::leave("r1")).is_err());

        assert_eq!(transport.opened(), vec!["u1"]);
        assert_eq!(transport.take_emitted(), vec![ClientEvent::join("r1")]);
        assert!(transport.emitted().is_empty());
    }
}
