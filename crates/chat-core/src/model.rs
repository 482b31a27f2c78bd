//! Conversation and message types shared by every crate in the workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Conversation identifier, assigned by the remote store.
pub type ConversationId = i64;

/// Message identifier, unique within its conversation.
pub type MessageId = u64;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Written by the local user.
    Outgoing,
    /// Written by the remote counterpart.
    Incoming,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Position of the message in its conversation.
    pub id: MessageId,
    /// Message body.
    pub text: String,
    /// Who wrote it.
    pub direction: Direction,
}

impl Message {
    /// Create a message.
    #[must_use]
    pub fn new(id: MessageId, text: impl Into<String>, direction: Direction) -> Self {
        Self {
            id,
            text: text.into(),
            direction,
        }
    }
}

/// A named chat thread with its local metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Stable identifier assigned by the remote store.
    pub id: ConversationId,
    /// Display name.
    pub name: String,
    /// Messages known for this conversation, including unconfirmed ones.
    pub message_count: u64,
    /// Set when a message arrived while the conversation was not active.
    pub has_unread: bool,
}

impl Conversation {
    /// Create a conversation with no known messages.
    #[must_use]
    pub fn new(id: ConversationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            message_count: 0,
            has_unread: false,
        }
    }
}

/// Opaque handle naming where a conversation's messages live in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreRef(String);

impl StoreRef {
    /// Wrap a store-specific path or key.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The raw reference string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conversation as listed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub name: String,
    /// Reference used for message operations on this conversation.
    pub reference: StoreRef,
}

/// Sort listed conversations by id, ascending.
pub fn sort_conversations(records: &mut [ConversationRecord]) {
    records.sort_by_key(|r| r.id);
}

/// Sort loaded messages by id, ascending.
pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.id);
}
