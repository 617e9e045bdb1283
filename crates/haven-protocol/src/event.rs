//! Realtime frames
//!
//! Frames are adjacently tagged: `{"event": "joinRoom", "data": {"roomId": "..."}}`.

use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, OutgoingMessage, TypingIndicator};
use crate::Result;

/// Events sent from the app to the realtime service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Announce interest in a conversation room.
    JoinRoom { room_id: String },

    /// Withdraw interest in a conversation room.
    LeaveRoom { room_id: String },

    /// Deliver a chat message.
    SendMessage(OutgoingMessage),

    /// Publish a typing indicator.
    Typing(TypingIndicator),
}

impl ClientEvent {
    pub fn join(room_id: impl Into<String>) -> Self {
        ClientEvent::JoinRoom {
            room_id: room_id.into(),
        }
    }

    pub fn leave(room_id: impl Into<String>) -> Self {
        ClientEvent::LeaveRoom {
            room_id: room_id.into(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "joinRoom",
            ClientEvent::LeaveRoom { .. } => "leaveRoom",
            ClientEvent::SendMessage(_) => "sendMessage",
            ClientEvent::Typing(_) => "typing",
        }
    }
}

/// Events pushed by the realtime service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// A message was posted to a room this connection joined.
    ReceiveMessage(ChatMessage),

    /// The other participant started or stopped typing.
    Typing(TypingIndicator),

    /// The service rejected something this connection sent.
    Error { message: String },
}

impl ServerEvent {
    /// Decode and validate one inbound text frame.
    pub fn decode(text: &str) -> Result<Self> {
        let event: ServerEvent = serde_json::from_str(text)?;
        match &event {
            ServerEvent::ReceiveMessage(message) => message.validate()?,
            ServerEvent::Typing(indicator) => indicator.validate()?,
            ServerEvent::Error { .. } => {}
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;

    #[test]
    fn test_client_event_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&ClientEvent::join("p1::u1::u2").encode().unwrap()).unwrap();
        assert_eq!(json["event"], "joinRoom");
        assert_eq!(json["data"]["roomId"], "p1::u1::u2");

        let send = ClientEvent::SendMessage(
            OutgoingMessage::new("p1::u1::u2", "u1", "u2", "hi").with_temp_id("t1"),
        );
        let json: serde_json::Value = serde_json::from_str(&send.encode().unwrap()).unwrap();
        assert_eq!(json["event"], "sendMessage");
        assert_eq!(json["data"]["senderId"], "u1");
        assert_eq!(json["data"]["receiverId"], "u2");
        assert_eq!(json["data"]["tempId"], "t1");
    }

    #[test]
    fn test_decode_receive_message() {
        let frame = r#"{"event":"receiveMessage","data":{"id":"m1","roomId":"p1::u1::u2",
            "senderId":"u2","receiverId":"u1","message":"hi","createdAt":"2024-01-01T00:00:00Z"}}"#;

        match ServerEvent::decode(frame).unwrap() {
            ServerEvent::ReceiveMessage(message) => {
                assert_eq!(message.id, "m1");
                assert_eq!(message.receiver_id, "u1");
                assert_eq!(message.created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_drops_malformed_frames() {
        // missing receiverId
        let missing = r#"{"event":"receiveMessage","data":{"id":"m1","roomId":"r",
            "senderId":"u2","message":"hi","createdAt":"2024-01-01T00:00:00Z"}}"#;
        assert!(matches!(
            ServerEvent::decode(missing),
            Err(ProtocolError::Json(_))
        ));

        let empty_id = r#"{"event":"receiveMessage","data":{"id":"","roomId":"r",
            "senderId":"u2","receiverId":"u1","message":"hi","createdAt":"2024-01-01T00:00:00Z"}}"#;
        assert!(matches!(
            ServerEvent::decode(empty_id),
            Err(ProtocolError::MissingField("id"))
        ));

        assert!(ServerEvent::decode(r#"{"event":"presence","data":{}}"#).is_err());
        assert!(ServerEvent::decode("not json").is_err());
    }

    #[test]
    fn test_decode_typing_and_error() {
        let typing = r#"{"event":"typing","data":{"roomId":"r","senderId":"u2",
            "receiverId":"u1","isTyping":true}}"#;
        assert!(matches!(
            ServerEvent::decode(typing).unwrap(),
            ServerEvent::Typing(TypingIndicator { is_typing: true, .. })
        ));

        let error = r#"{"event":"error","data":{"message":"room not found"}}"#;
        assert_eq!(
            ServerEvent::decode(error).unwrap(),
            ServerEvent::Error {
                message: "room not found".to_string()
            }
        );
    }
}
