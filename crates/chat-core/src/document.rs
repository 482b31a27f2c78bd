//! Field-level shapes of the documents kept in the remote store.
//!
//! These must stay byte-compatible with data already written by other
//! clients, including the `outcoming` spelling of outgoing messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ConversationId, Direction, Message, MessageId};

/// Stored `type` token of a message document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Incoming,
    Outcoming,
}

impl From<Direction> for MessageKind {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Incoming => Self::Incoming,
            Direction::Outgoing => Self::Outcoming,
        }
    }
}

impl From<MessageKind> for Direction {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Incoming => Self::Incoming,
            MessageKind::Outcoming => Self::Outgoing,
        }
    }
}

/// `{ chat_id, name }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationDocument {
    pub chat_id: ConversationId,
    pub name: String,
}

impl ConversationDocument {
    /// Parse a raw document, returning `None` when a field is missing or mistyped.
    #[must_use]
    pub fn parse(raw: &Value) -> Option<Self> {
        match Self::deserialize(raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::debug!("Dropping conversation document: {e}");
                None
            }
        }
    }
}

/// `{ message_id, text, type }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDocument {
    pub message_id: MessageId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl MessageDocument {
    /// Parse a raw document, returning `None` when a field is missing or mistyped.
    #[must_use]
    pub fn parse(raw: &Value) -> Option<Self> {
        match Self::deserialize(raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::debug!("Dropping message document: {e}");
                None
            }
        }
    }

    /// Document body as JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "message_id": self.message_id,
            "text": self.text,
            "type": self.kind,
        })
    }
}

impl From<&Message> for MessageDocument {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id,
            text: message.text.clone(),
            kind: message.direction.into(),
        }
    }
}

impl From<MessageDocument> for Message {
    fn from(doc: MessageDocument) -> Self {
        Self {
            id: doc.message_id,
            text: doc.text,
            direction: doc.kind.into(),
        }
    }
}

/// Parse a batch of raw message documents, skipping the ones that fail.
#[must_use]
pub fn parse_messages<'a>(raws: impl IntoIterator<Item = &'a Value>) -> Vec<Message> {
    raws.into_iter()
        .filter_map(MessageDocument::parse)
        .map(Message::from)
        .collect()
}
