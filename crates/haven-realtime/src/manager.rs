//! Realtime Session Manager
//!
//! One manager per signed-in session. It owns at most one live connection,
//! remembers which rooms the session is interested in, keeps the unread cache,
//! and fans incoming events out to subscribers.
//!
//! Inbound transport events for a connection are handled one at a time by a
//! pump task. No lock is held while user callbacks run.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use haven_backend::Backend;
use haven_protocol::{
    ChatMessage, ClientEvent, OutgoingMessage, RetryPolicy, RoomSummary, ServerEvent,
    TypingIndicator,
};
use haven_transport::{Connection, EventStream, Transport, TransportEvent};

use crate::error::RealtimeError;
use crate::listeners::{Handler, Listeners, Subscription};
use crate::notify::{ChatFocus, LogNotifier, MessageNotice, Navigator, NoopNavigator, Notifier};
use crate::rooms::RoomMembership;
use crate::state::ConnectionState;
use crate::unread::UnreadCounter;
use crate::Result;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_POLL_MAX_BACKOFF: Duration = Duration::from_secs(300);

struct LiveConnection {
    identity: String,
    epoch: u64,
    state: ConnectionState,
    handle: Box<dyn Connection>,
    /// Event pump and unread poller
    tasks: Vec<JoinHandle<()>>,
}

impl LiveConnection {
    fn transition_to(&mut self, target: ConnectionState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(RealtimeError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }

        tracing::debug!(
            identity = %self.identity,
            from = %self.state,
            to = %target,
            "Connection state transition"
        );

        self.state = target;
        Ok(())
    }

    fn emit(&self, event: ClientEvent) {
        let name = event.name();
        if let Err(e) = self.handle.emit(event) {
            tracing::warn!(error = %e, event = name, "Failed to emit realtime event");
        }
    }

    fn shutdown(self) {
        self.handle.close();
        for task in self.tasks {
            task.abort();
        }
    }
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    /// Schedule of the unread poller; `None` disables polling
    unread_poll: Option<RetryPolicy>,
    /// The live connection, if any
    connection: Arc<Mutex<Option<LiveConnection>>>,
    /// Bumped on every connect and teardown
    epoch: Arc<AtomicU64>,
    /// Issue number of the latest unread refresh
    refresh_seq: Arc<AtomicU64>,
    rooms: Arc<RwLock<RoomMembership>>,
    /// Last room listing fetched from the backend
    room_listing: Arc<RwLock<Vec<RoomSummary>>>,
    focus: Arc<RwLock<ChatFocus>>,
    unread: UnreadCounter,
    message_listeners: Listeners<ChatMessage>,
    typing_listeners: Listeners<TypingIndicator>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, backend: Arc<dyn Backend>) -> Self {
        Self {
            transport,
            backend,
            notifier: Arc::new(LogNotifier),
            navigator: Arc::new(NoopNavigator),
            unread_poll: Some(RetryPolicy::new(
                DEFAULT_POLL_INTERVAL,
                DEFAULT_POLL_MAX_BACKOFF,
                u32::MAX,
            )),
            connection: Arc::new(Mutex::new(None)),
            epoch: Arc::new(AtomicU64::new(0)),
            refresh_seq: Arc::new(AtomicU64::new(0)),
            rooms: Arc::new(RwLock::new(RoomMembership::new())),
            room_listing: Arc::new(RwLock::new(Vec::new())),
            focus: Arc::new(RwLock::new(ChatFocus::Background)),
            unread: UnreadCounter::new(),
            message_listeners: Listeners::new(),
            typing_listeners: Listeners::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Poll the unread count while connected. The policy's initial delay is
    /// the poll interval; failures back off up to its max delay.
    pub fn with_unread_polling(mut self, schedule: Option<RetryPolicy>) -> Self {
        self.unread_poll = schedule;
        self
    }

    // === Connection lifecycle ===

    /// Open the connection for `identity`. Returns before the transport
    /// handshake completes; a no-op if a connection already exists.
    pub fn connect(&self, identity: &str) -> Result<()> {
        if identity.trim().is_empty() {
            return Err(RealtimeError::EmptyIdentity);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| RealtimeError::NoRuntime)?;

        let mut slot = self.connection.lock();
        if let Some(live) = slot.as_ref() {
            if live.identity == identity {
                tracing::debug!(identity = %identity, "Already connected");
            } else {
                tracing::warn!(
                    connected = %live.identity,
                    requested = %identity,
                    "Connection exists for another identity, ignoring connect"
                );
            }
            return Ok(());
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = self.transport.open(identity, events_tx)?;
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let mut tasks = vec![runtime.spawn(self.clone().run_pump(epoch, events_rx))];
        if let Some(schedule) = self.unread_poll.clone() {
            tasks.push(runtime.spawn(self.clone().poll_unread(
                epoch,
                identity.to_string(),
                schedule,
            )));
        }

        *slot = Some(LiveConnection {
            identity: identity.to_string(),
            epoch,
            state: ConnectionState::Connecting,
            handle,
            tasks,
        });

        tracing::info!(identity = %identity, epoch, "Connecting realtime session");

        Ok(())
    }

    /// Tear the connection down. Room membership and listeners are kept so a
    /// later `connect` picks up where this one left off.
    pub fn disconnect(&self) {
        if !self.teardown() {
            tracing::debug!("Disconnect requested with no live connection");
        }
    }

    fn teardown(&self) -> bool {
        let live = self.connection.lock().take();
        match live {
            Some(live) => {
                self.epoch.fetch_add(1, Ordering::SeqCst);
                tracing::info!(identity = %live.identity, "Realtime connection torn down");
                live.shutdown();
                true
            }
            None => false,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .lock()
            .as_ref()
            .map(|live| live.state)
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Identity bound to the live connection
    pub fn identity(&self) -> Option<String> {
        self.connection
            .lock()
            .as_ref()
            .map(|live| live.identity.clone())
    }

    // === Rooms ===

    /// Record interest in a room. The join goes out now if the transport is
    /// connected, otherwise on the next "connected" acknowledgment.
    /// Returns false if the room was already joined.
    pub fn join_room(&self, room_id: &str) -> bool {
        let slot = self.connection.lock();
        if !self.rooms.write().insert(room_id) {
            tracing::debug!(room_id = %room_id, "Already a member of room");
            return false;
        }

        match slot.as_ref().filter(|live| live.state.is_connected()) {
            Some(live) => {
                live.emit(ClientEvent::join(room_id));
                tracing::info!(room_id = %room_id, "Joined room");
            }
            None => {
                tracing::info!(room_id = %room_id, "Recorded room, join deferred until connected");
            }
        }

        true
    }

    /// Returns false if the room was not joined.
    pub fn leave_room(&self, room_id: &str) -> bool {
        let slot = self.connection.lock();
        if !self.rooms.write().remove(room_id) {
            tracing::debug!(room_id = %room_id, "Not a member of room");
            return false;
        }

        if let Some(live) = slot.as_ref().filter(|live| live.state.is_connected()) {
            live.emit(ClientEvent::leave(room_id));
        }
        tracing::info!(room_id = %room_id, "Left room");

        true
    }

    pub fn joined_rooms(&self) -> Vec<String> {
        self.rooms.read().ids().to_vec()
    }

    /// Refresh the cached room listing from the backend.
    pub async fn fetch_rooms(&self, identity: &str) -> Option<Vec<RoomSummary>> {
        let epoch = self.epoch.load(Ordering::SeqCst);

        let rooms = match self.backend.chat_rooms(identity).await {
            Ok(rooms) => rooms,
            Err(e) => {
                tracing::warn!(error = %e, identity = %identity, "Failed to fetch room listing");
                return None;
            }
        };

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("Discarding room listing fetched across a reconnect");
            return None;
        }

        *self.room_listing.write() = rooms.clone();
        tracing::info!(rooms = rooms.len(), "Room listing refreshed");

        Some(rooms)
    }

    pub fn room_listing(&self) -> Vec<RoomSummary> {
        self.room_listing.read().clone()
    }

    // === Outbound ===

    /// Fire-and-forget. Silently dropped when there is no connection.
    pub fn send_message(&self, message: OutgoingMessage) {
        let slot = self.connection.lock();
        match slot.as_ref() {
            Some(live) => {
                tracing::debug!(
                    room_id = %message.room_id,
                    temp_id = ?message.temp_id,
                    "Sending message"
                );
                live.emit(ClientEvent::SendMessage(message));
            }
            None => {
                tracing::debug!(room_id = %message.room_id, "Not connected, dropping outbound message");
            }
        }
    }

    pub fn send_typing(&self, indicator: TypingIndicator) {
        let slot = self.connection.lock();
        match slot.as_ref() {
            Some(live) => live.emit(ClientEvent::Typing(indicator)),
            None => tracing::debug!("Not connected, dropping typing indicator"),
        }
    }

    // === Subscriptions ===

    pub fn on_message(&self, handler: Handler<ChatMessage>) {
        self.message_listeners.add(handler);
    }

    pub fn remove_message_handler(&self, handler: &Handler<ChatMessage>) -> bool {
        self.message_listeners.remove(handler)
    }

    pub fn on_typing(&self, handler: Handler<TypingIndicator>) {
        self.typing_listeners.add(handler);
    }

    pub fn remove_typing_handler(&self, handler: &Handler<TypingIndicator>) -> bool {
        self.typing_listeners.remove(handler)
    }

    pub fn on_unread_count_change(&self, handler: Handler<u64>) -> Subscription {
        self.unread.subscribe(handler)
    }

    // === Unread count ===

    pub fn unread_count(&self) -> u64 {
        self.unread.get()
    }

    pub fn increment_unread_count(&self) -> bool {
        self.unread.increment()
    }

    pub fn decrement_unread_count(&self) -> bool {
        self.unread.decrement()
    }

    pub fn reset_unread_count(&self) -> bool {
        self.unread.reset()
    }

    /// Reconcile the cache with the backend. On failure the cache is left
    /// as is and `None` is returned.
    pub async fn fetch_unread_count(&self, identity: &str) -> Option<u64> {
        match self.refresh_unread(identity).await {
            Ok(count) => Some(count),
            Err(RealtimeError::StaleResult) => {
                tracing::debug!("Discarding superseded unread count");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, identity = %identity, "Failed to refresh unread count");
                None
            }
        }
    }

    async fn refresh_unread(&self, identity: &str) -> Result<u64> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let version = self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let count = self.backend.unread_count(identity).await?;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            return Err(RealtimeError::StaleResult);
        }
        // a refresh issued later already answered
        if self.unread.set_fetched(count, version).is_none() {
            return Err(RealtimeError::StaleResult);
        }

        Ok(count)
    }

    /// Refresh the unread count off the event pump.
    fn spawn_unread_refresh(&self, identity: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime, skipping unread refresh");
            return;
        };

        let manager = self.clone();
        runtime.spawn(async move {
            manager.fetch_unread_count(&identity).await;
        });
    }

    // === Chat focus ===

    /// Called by whichever screen owns the chat view.
    pub fn set_chat_focus(&self, focus: ChatFocus) {
        tracing::debug!(room_id = ?focus.room_id(), "Chat focus changed");
        *self.focus.write() = focus;
    }

    pub fn chat_focus(&self) -> ChatFocus {
        self.focus.read().clone()
    }

    // === Inbound ===

    async fn run_pump(self, epoch: u64, mut events: EventStream) {
        while let Some(event) = events.recv().await {
            self.handle_event(epoch, event);
        }
        tracing::debug!(epoch, "Realtime event stream ended");
    }

    /// Never waits on the backend: refreshes are spawned so a slow API
    /// cannot hold back later frames.
    fn handle_event(&self, epoch: u64, event: TransportEvent) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(epoch, "Ignoring event from a previous connection");
            return;
        }

        match event {
            TransportEvent::Connected => self.on_connected(epoch),
            TransportEvent::Dropped { reason } => {
                tracing::warn!(reason = %reason, "Realtime connection dropped, transport reconnecting");
                if let Some(live) = self.connection.lock().as_mut() {
                    if let Err(e) = live.transition_to(ConnectionState::Connecting) {
                        tracing::warn!(error = %e, "Unexpected drop");
                    }
                }
            }
            TransportEvent::Closed { reason } => {
                tracing::error!(reason = %reason, "Realtime transport gave up");
                self.teardown();
            }
            TransportEvent::Server(ServerEvent::ReceiveMessage(message)) => {
                self.receive_message(message)
            }
            TransportEvent::Server(ServerEvent::Typing(indicator)) => {
                self.typing_listeners.emit(&indicator);
            }
            TransportEvent::Server(ServerEvent::Error { message }) => {
                tracing::warn!(error = %message, "Realtime service reported an error");
            }
        }
    }

    /// Replay every room join, then reconcile the unread count.
    fn on_connected(&self, epoch: u64) {
        let ready = {
            let mut slot = self.connection.lock();
            match slot.as_mut().filter(|live| live.epoch == epoch) {
                Some(live) => {
                    if let Err(e) = live.transition_to(ConnectionState::Connected) {
                        tracing::warn!(error = %e, "Unexpected connected acknowledgment");
                    }

                    let rooms = self.rooms.read();
                    for room_id in rooms.ids() {
                        live.emit(ClientEvent::join(room_id.as_str()));
                    }
                    Some((live.identity.clone(), rooms.len()))
                }
                None => None,
            }
        };

        let Some((identity, replayed)) = ready else {
            return;
        };

        tracing::info!(identity = %identity, rooms = replayed, "Realtime session ready");
        self.spawn_unread_refresh(identity);
    }

    fn receive_message(&self, message: ChatMessage) {
        tracing::debug!(
            message_id = %message.id,
            room_id = %message.room_id,
            "Incoming message"
        );

        // every open conversation screen may care, whoever it is addressed to
        self.message_listeners.emit(&message);

        let Some(identity) = self.identity().filter(|id| message.is_addressed_to(id)) else {
            return;
        };

        let focus = self.chat_focus();
        if focus.room_id() != Some(message.room_id.as_str()) {
            self.unread.increment();
        }
        self.spawn_unread_refresh(identity);

        if focus.is_background() {
            self.notifier
                .notify(MessageNotice::new(message, Arc::clone(&self.navigator)));
        } else {
            tracing::debug!(room_id = %message.room_id, "Chat screen active, notification suppressed");
        }
    }

    async fn poll_unread(self, epoch: u64, identity: String, schedule: RetryPolicy) {
        let mut failures: u32 = 0;

        loop {
            tokio::time::sleep(schedule.delay_for(failures)).await;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }

            match self.refresh_unread(&identity).await {
                Ok(_) => failures = 0,
                Err(RealtimeError::StaleResult) => return,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(error = %e, failures, "Unread poll failed, backing off");
                }
            }
        }
    }

    #[cfg(test)]
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            backend: Arc::clone(&self.backend),
            notifier: Arc::clone(&self.notifier),
            navigator: Arc::clone(&self.navigator),
            unread_poll: self.unread_poll.clone(),
            connection: Arc::clone(&self.connection),
            epoch: Arc::clone(&self.epoch),
            refresh_seq: Arc::clone(&self.refresh_seq),
            rooms: Arc::clone(&self.rooms),
            room_listing: Arc::clone(&self.room_listing),
            focus: Arc::clone(&self.focus),
            unread: self.unread.clone(),
            message_listeners: self.message_listeners.clone(),
            typing_listeners: self.typing_listeners.clone(),
        }
    }
}
