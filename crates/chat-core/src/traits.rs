//! Core traits for the remote store and the completion endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ConversationRecord, Message, StoreRef};

/// Remote store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store returned no data")]
    NoData,
    #[error("Store error: {0}")]
    Other(String),
}

/// Completion endpoint error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("Endpoint returned no data")]
    NoData,
    #[error("Network error: {0}")]
    Other(String),
}

/// Outcome of probing the completion endpoint with a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// The endpoint accepted the credential.
    Valid,
    /// The endpoint answered with anything other than 200.
    Invalid,
    /// The endpoint could not be reached.
    Error,
}

/// Trait for document-store backends holding conversations and messages.
///
/// Implementations hand results back sorted by id, ascending, and drop
/// documents that fail to parse instead of failing the whole batch.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List every conversation.
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError>;

    /// List the messages of one conversation.
    async fn list_messages(&self, conversation: &StoreRef) -> Result<Vec<Message>, StoreError>;

    /// Append a message to a conversation.
    async fn append_message(
        &self,
        conversation: &StoreRef,
        message: &Message,
    ) -> Result<(), StoreError>;
}

/// Trait for text-generation backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Check a credential against the endpoint. Never has side effects.
    async fn check_credential(&self, key: &str) -> CheckStatus;

    /// Generate a reply to `prompt`.
    async fn generate_reply(&self, prompt: &str) -> Result<String, NetworkError>;
}
