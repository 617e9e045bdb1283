//! Message payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::Result;

/// A chat message delivered by the realtime service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned message id
    pub id: String,
    /// Conversation room the message belongs to
    pub room_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Message body
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Reject payloads whose identifiers are present but empty.
    pub fn validate(&self) -> Result<()> {
        require("id", &self.id)?;
        require("roomId", &self.room_id)?;
        require("senderId", &self.sender_id)?;
        require("receiverId", &self.receiver_id)
    }

    /// Whether this message is addressed to `identity`
    pub fn is_addressed_to(&self, identity: &str) -> bool {
        self.receiver_id == identity
    }

    /// Short preview of the body for notifications
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.message.chars();
        let preview: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{preview}…")
        } else {
            preview
        }
    }
}

/// A message the app asks the realtime service to deliver.
///
/// `temp_id` is an optional client-side correlation id. It is passed through
/// untouched so the UI can reconcile its optimistic copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub room_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

impl OutgoingMessage {
    pub fn new(
        room_id: impl Into<String>,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            message: text.into(),
            temp_id: None,
        }
    }

    pub fn with_temp_id(mut self, temp_id: impl Into<String>) -> Self {
        self.temp_id = Some(temp_id.into());
        self
    }
}

/// Typing indicator, used in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub room_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub is_typing: bool,
}

impl TypingIndicator {
    pub fn validate(&self) -> Result<()> {
        require("roomId", &self.room_id)?;
        require("senderId", &self.sender_id)
    }
}

/// One entry of the backend's room listing for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub property_id: String,
    /// The participant on the other side of the conversation
    pub other_user_id: String,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u64,
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(ProtocolError::MissingField(field))
    } else {
        Ok(())
    }
}
