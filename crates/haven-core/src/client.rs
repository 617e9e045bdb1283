//! Chat client container
//!
//! Built on sign-in, consumed on sign-out. Owns the session, the
//! configuration it was built from, and the realtime session manager.

use std::sync::Arc;
use uuid::Uuid;

use haven_backend::HttpBackend;
use haven_protocol::{room_id, OutgoingMessage, RoomSummary, TypingIndicator};
use haven_realtime::{ChatFocus, SessionManager};
use haven_transport::WsTransport;

use crate::config::Config;
use crate::error::CoreError;
use crate::session::Session;
use crate::Result;

pub struct ChatClient {
    config: Config,
    session: Session,
    manager: SessionManager,
}

impl ChatClient {
    /// Sign in over HTTP and websocket, then connect.
    pub fn sign_in(config: Config, session: Session) -> Result<Self> {
        let manager = Self::build_manager(&config, &session)?;
        Self::with_manager(config, session, manager)
    }

    /// Manager wired to the configured REST API and realtime endpoint.
    /// Callers that need their own notifier or navigator start from here.
    pub fn build_manager(config: &Config, session: &Session) -> Result<SessionManager> {
        config.validate()?;

        let backend = HttpBackend::new(
            &config.api_base_url,
            session.token(),
            config.request_timeout(),
        )?;
        let transport = WsTransport::new(&config.realtime_url, config.reconnect.clone())?;

        Ok(
            SessionManager::new(Arc::new(transport), Arc::new(backend))
                .with_unread_polling(config.unread_poll.schedule()),
        )
    }

    pub fn with_manager(config: Config, session: Session, manager: SessionManager) -> Result<Self> {
        manager.connect(&session.user_id)?;

        tracing::info!(user_id = %session.user_id, "Signed in");

        Ok(Self {
            config,
            session,
            manager,
        })
    }

    /// Disconnect and drop all session state.
    pub fn sign_out(self) {
        drop(self);
    }

    // === Conversations ===

    /// Join the room for `property_id` shared with `peer_id` and bring it to
    /// the foreground. Returns the room id.
    pub fn open_conversation(&self, property_id: &str, peer_id: &str) -> String {
        let room = room_id(property_id, &self.session.user_id, peer_id);

        self.manager.join_room(&room);
        self.manager.set_chat_focus(ChatFocus::foreground(room.as_str()));

        room
    }

    /// The chat screen went away. Membership is kept so messages keep arriving.
    pub fn close_conversation(&self) {
        self.manager.set_chat_focus(ChatFocus::Background);
    }

    pub fn leave_conversation(&self, room_id: &str) {
        if self.manager.chat_focus().room_id() == Some(room_id) {
            self.close_conversation();
        }
        self.manager.leave_room(room_id);
    }

    /// Send `text` as the signed-in user. Returns the temp id the message was
    /// tagged with.
    pub fn send_text(&self, room_id: &str, receiver_id: &str, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(CoreError::EmptyMessage);
        }

        let temp_id = Uuid::new_v4().to_string();
        self.manager.send_message(
            OutgoingMessage::new(room_id, self.session.user_id.as_str(), receiver_id, text)
                .with_temp_id(temp_id.as_str()),
        );

        Ok(temp_id)
    }

    pub fn send_typing(&self, room_id: &str, receiver_id: &str, is_typing: bool) {
        self.manager.send_typing(TypingIndicator {
            room_id: room_id.to_string(),
            sender_id: self.session.user_id.clone(),
            receiver_id: receiver_id.to_string(),
            is_typing,
        });
    }

    /// Reconcile the unread count and room listing with the backend.
    /// Returns false if either request failed.
    pub async fn refresh(&self) -> bool {
        let user_id = self.session.user_id.as_str();
        let unread = self.manager.fetch_unread_count(user_id).await;
        let rooms = self.manager.fetch_rooms(user_id).await;

        unread.is_some() && rooms.is_some()
    }

    // === Accessors ===

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn unread_count(&self) -> u64 {
        self.manager.unread_count()
    }

    pub fn rooms(&self) -> Vec<RoomSummary> {
        self.manager.room_listing()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.manager.disconnect();
        tracing::info!(user_id = %self.session.user_id, "Signed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use haven_backend::{Backend, BackendError};
    use haven_protocol::ClientEvent;
    use haven_realtime::RealtimeError;
    use haven_transport::MemoryTransport;

    struct StaticBackend {
        count: u64,
        rooms: Option<Vec<RoomSummary>>,
    }

    #[async_trait]
    impl Backend for StaticBackend {
        async fn unread_count(&self, _user_id: &str) -> haven_backend::Result<u64> {
            Ok(self.count)
        }

        async fn chat_rooms(&self, _user_id: &str) -> haven_backend::Result<Vec<RoomSummary>> {
            self.rooms.clone().ok_or(BackendError::Status {
                status: 503,
                endpoint: "/chat/rooms".to_string(),
            })
        }
    }

    fn client(rooms: Option<Vec<RoomSummary>>) -> (ChatClient, MemoryTransport) {
        let transport = MemoryTransport::new();
        let manager = SessionManager::new(
            Arc::new(transport.clone()),
            Arc::new(StaticBackend { count: 4, rooms }),
        )
        .with_unread_polling(None);

        let client = ChatClient::with_manager(
            Config::default(),
            Session::new("u2", "token").unwrap(),
            manager,
        )
        .unwrap();

        (client, transport)
    }

    #[tokio::test]
    async fn test_open_conversation_joins_and_focuses() {
        let (client, transport) = client(Some(Vec::new()));

        let room = client.open_conversation("p1", "u1");

        assert_eq!(room, "p1::u1::u2");
        assert_eq!(client.manager().joined_rooms(), vec!["p1::u1::u2"]);
        assert_eq!(
            client.manager().chat_focus(),
            ChatFocus::foreground("p1::u1::u2")
        );
        assert_eq!(transport.opened(), vec!["u2"]);

        client.leave_conversation(&room);
        assert!(client.manager().chat_focus().is_background());
        assert!(client.manager().joined_rooms().is_empty());
    }

    #[tokio::test]
    async fn test_send_text_stamps_sender_and_temp_id() {
        let (client, transport) = client(Some(Vec::new()));

        let temp_id = client.send_text("p1::u1::u2", "u1", "still available?").unwrap();

        assert_eq!(
            transport.take_emitted(),
            vec![ClientEvent::SendMessage(
                OutgoingMessage::new("p1::u1::u2", "u2", "u1", "still available?")
                    .with_temp_id(temp_id)
            )]
        );
        assert!(matches!(
            client.send_text("p1::u1::u2", "u1", "  "),
            Err(CoreError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn test_refresh_reports_partial_failure() {
        let (client, _transport) = client(None);

        assert!(!client.refresh().await);
        assert_eq!(client.unread_count(), 4);
        assert!(client.rooms().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_closes_connection() {
        let (client, transport) = client(Some(Vec::new()));

        client.sign_out();

        assert_eq!(transport.close_count(), 1);
    }

    #[test]
    fn test_sign_in_needs_runtime() {
        let result = ChatClient::sign_in(Config::default(), Session::new("u1", "token").unwrap());

        assert!(matches!(
            result,
            Err(CoreError::Realtime(RealtimeError::NoRuntime))
        ));
    }

    #[test]
    fn test_sign_in_validates_config() {
        let config = Config {
            realtime_url: "https://localhost:3000/ws".to_string(),
            ..Config::default()
        };

        assert!(matches!(
            ChatClient::sign_in(config, Session::new("u1", "token").unwrap()),
            Err(CoreError::Config(_))
        ));
    }
}
