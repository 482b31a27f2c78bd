//! Notifications from the session to the presentation layer.

use serde::{Deserialize, Serialize};

use crate::model::{Conversation, ConversationId, Direction, Message};

/// A read-only projection emitted after a state change commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The whole conversation list was replaced.
    ConversationListReplaced { conversations: Vec<Conversation> },
    /// One conversation's row changed (unread flag, count).
    ConversationRowUpdated { id: ConversationId },
    /// A conversation was removed from the list.
    ConversationRemoved { id: ConversationId },
    /// The thread view shows a new set of messages.
    ThreadReplaced { messages: Vec<Message> },
    /// One message was appended to the thread view.
    MessageInserted { index: usize, direction: Direction },
    /// Scroll the thread view to a message.
    ScrollToMessage { index: usize },
    /// Close any overlay navigation (sidebar, menus).
    CloseOverlay,
    /// A user-facing error.
    ErrorOccurred { message: String },
}

impl SessionEvent {
    /// Short name used in log lines.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConversationListReplaced { .. } => "conversation_list_replaced",
            Self::ConversationRowUpdated { .. } => "conversation_row_updated",
            Self::ConversationRemoved { .. } => "conversation_removed",
            Self::ThreadReplaced { .. } => "thread_replaced",
            Self::MessageInserted { .. } => "message_inserted",
            Self::ScrollToMessage { .. } => "scroll_to_message",
            Self::CloseOverlay => "close_overlay",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }
}
