//! Core abstractions for the chat session core.
//!
//! This crate provides the fundamental building blocks:
//! - `Conversation`, `Message` - the data model
//! - Document shapes of the remote store
//! - `RemoteStore` and `CompletionClient` traits
//! - `Intent` / `SessionEvent` - the presentation boundary
//! - `EventStore` - broadcast + history for late subscribers
//! - `ChatConfig` - TOML configuration

pub mod config;
pub mod document;
pub mod event;
pub mod event_store;
pub mod intent;
pub mod model;
pub mod traits;

pub use config::{ChatConfig, CompletionConfig, ConfigError, StoreBackend, StoreConfig};
pub use event::SessionEvent;
pub use event_store::EventStore;
pub use intent::Intent;
pub use model::{
    Conversation, ConversationId, ConversationRecord, Direction, Message, MessageId, StoreRef,
};
pub use traits::{CheckStatus, CompletionClient, NetworkError, RemoteStore, StoreError};
