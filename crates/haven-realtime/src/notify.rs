//! Passive notifications for incoming messages
//!
//! When a message addressed to the signed-in user arrives while no
//! conversation is on screen, the manager hands a [`MessageNotice`] to the
//! [`Notifier`]. Opening the notice asks the [`Navigator`] to show the
//! conversation.

use std::sync::Arc;

use haven_protocol::ChatMessage;

const PREVIEW_CHARS: usize = 80;

/// Which conversation, if any, the user is looking at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChatFocus {
    #[default]
    Background,
    Foreground { room_id: String },
}

impl ChatFocus {
    pub fn foreground(room_id: impl Into<String>) -> Self {
        ChatFocus::Foreground {
            room_id: room_id.into(),
        }
    }

    pub fn is_background(&self) -> bool {
        matches!(self, ChatFocus::Background)
    }

    pub fn room_id(&self) -> Option<&str> {
        match self {
            ChatFocus::Background => None,
            ChatFocus::Foreground { room_id } => Some(room_id),
        }
    }
}

/// Where a notice leads when opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTarget {
    pub room_id: String,
    /// The other participant
    pub peer_id: String,
}

/// Shows a conversation. Implemented by the UI layer.
pub trait Navigator: Send + Sync {
    fn open_conversation(&self, target: &ConversationTarget);
}

/// Raises a toast-style notification. Implemented by the UI layer.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: MessageNotice);
}

pub struct MessageNotice {
    pub message: ChatMessage,
    navigator: Arc<dyn Navigator>,
}

impl MessageNotice {
    pub fn new(message: ChatMessage, navigator: Arc<dyn Navigator>) -> Self {
        Self { message, navigator }
    }

    pub fn target(&self) -> ConversationTarget {
        ConversationTarget {
            room_id: self.message.room_id.clone(),
            peer_id: self.message.sender_id.clone(),
        }
    }

    pub fn preview(&self) -> String {
        self.message.preview(PREVIEW_CHARS)
    }

    /// Request navigation to the conversation this notice is about.
    pub fn open(&self) {
        self.navigator.open_conversation(&self.target());
    }
}

impl std::fmt::Debug for MessageNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageNotice")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Logs notices instead of showing them.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: MessageNotice) {
        tracing::info!(
            room_id = %notice.message.room_id,
            sender_id = %notice.message.sender_id,
            preview = %notice.preview(),
            "New message"
        );
    }
}

/// Ignores navigation requests.
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn open_conversation(&self, target: &ConversationTarget) {
        tracing::debug!(room_id = %target.room_id, "No navigator installed, ignoring request");
    }
}
