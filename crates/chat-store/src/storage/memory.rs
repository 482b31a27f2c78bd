//! In-memory document store.

use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chat_core::{
    ConversationId, ConversationRecord, Message, RemoteStore, StoreError, StoreRef,
    document::{ConversationDocument, MessageDocument, parse_messages},
    model::{sort_conversations, sort_messages},
};
use serde_json::Value;

/// One conversation document and its `messages` sub-collection.
#[derive(Default)]
struct Collection {
    document: Value,
    messages: Vec<Value>,
}

/// In-memory storage implementation.
///
/// Keeps raw JSON documents so reads go through the same lenient parsing
/// as a real document store. Useful for development and tests.
/// Data is lost on restart.
pub struct MemoryStore {
    collections: RwLock<HashMap<StoreRef, Collection>>,
    next_key: AtomicU64,
    available: AtomicBool,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            next_key: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Add a conversation document and return its reference.
    ///
    /// # Errors
    /// Returns error if the store lock is poisoned.
    pub fn insert_conversation(
        &self,
        id: ConversationId,
        name: impl Into<String>,
    ) -> Result<StoreRef, StoreError> {
        let doc = ConversationDocument {
            chat_id: id,
            name: name.into(),
        };
        let value = serde_json::to_value(doc).map_err(|e| StoreError::Other(e.to_string()))?;
        self.insert_raw_conversation(value)
    }

    /// Add an arbitrary conversation document, valid or not.
    ///
    /// # Errors
    /// Returns error if the store lock is poisoned.
    pub fn insert_raw_conversation(&self, document: Value) -> Result<StoreRef, StoreError> {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let reference = StoreRef::new(format!("allChats/doc-{key}"));

        self.collections
            .write()
            .map_err(|e| StoreError::Other(e.to_string()))?
            .insert(
                reference.clone(),
                Collection {
                    document,
                    messages: Vec::new(),
                },
            );

        Ok(reference)
    }

    /// Add an arbitrary message document, valid or not.
    ///
    /// # Errors
    /// Returns error if the reference is unknown.
    pub fn insert_raw_message(&self, conversation: &StoreRef, document: Value) -> Result<(), StoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| StoreError::Other(e.to_string()))?;

        let collection = collections
            .get_mut(conversation)
            .ok_or_else(|| unknown_reference(conversation))?;

        collection.messages.push(document);

        Ok(())
    }

    /// Raw message documents in insertion order.
    ///
    /// # Errors
    /// Returns error if the reference is unknown.
    pub fn raw_messages(&self, conversation: &StoreRef) -> Result<Vec<Value>, StoreError> {
        self.collections
            .read()
            .map_err(|e| StoreError::Other(e.to_string()))?
            .get(conversation)
            .map(|c| c.messages.clone())
            .ok_or_else(|| unknown_reference(conversation))
    }

    /// Simulate the store becoming unreachable (`false`) or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StoreError::Other("Store unavailable".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_reference(reference: &StoreRef) -> StoreError {
    StoreError::Other(format!("Unknown conversation reference: {reference}"))
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        self.ensure_available()?;

        let collections = self
            .collections
            .read()
            .map_err(|e| StoreError::Other(e.to_string()))?;

        let mut records: Vec<ConversationRecord> = collections
            .iter()
            .filter_map(|(reference, collection)| {
                ConversationDocument::parse(&collection.document).map(|doc| ConversationRecord {
                    id: doc.chat_id,
                    name: doc.name,
                    reference: reference.clone(),
                })
            })
            .collect();

        sort_conversations(&mut records);

        Ok(records)
    }

    async fn list_messages(&self, conversation: &StoreRef) -> Result<Vec<Message>, StoreError> {
        self.ensure_available()?;

        let collections = self
            .collections
            .read()
            .map_err(|e| StoreError::Other(e.to_string()))?;

        let collection = collections.get(conversation).ok_or(StoreError::NoData)?;

        let mut messages = parse_messages(&collection.messages);
        sort_messages(&mut messages);

        Ok(messages)
    }

    async fn append_message(
        &self,
        conversation: &StoreRef,
        message: &Message,
    ) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.insert_raw_message(conversation, MessageDocument::from(message).to_value())
    }
}

#[cfg(test)]
mod tests {
    use chat_core::Direction;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_conversations_sorted_by_id() {
        let store = MemoryStore::new();
        store.insert_conversation(2, "B").unwrap();
        store.insert_conversation(1, "A").unwrap();
        store
            .insert_raw_conversation(json!({ "name": "no id" }))
            .unwrap();

        let records = store.list_conversations().await.unwrap();
        let listed: Vec<_> = records.iter().map(|r| (r.id, r.name.as_str())).collect();
        assert_eq!(listed, vec![(1, "A"), (2, "B")]);
    }

    #[tokio::test]
    async fn test_messages_sorted_regardless_of_append_order() {
        let store = MemoryStore::new();
        let chat = store.insert_conversation(1, "A").unwrap();

        for id in [4, 0, 3, 1, 2] {
            let message = Message::new(id, format!("m{id}"), Direction::Incoming);
            store.append_message(&chat, &message).await.unwrap();
        }

        let ids: Vec<_> = store
            .list_messages(&chat)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_partial_documents_are_dropped() {
        let store = MemoryStore::new();
        let chat = store.insert_conversation(1, "A").unwrap();
        store
            .insert_raw_message(&chat, json!({ "message_id": 1, "text": "ok", "type": "incoming" }))
            .unwrap();
        store
            .insert_raw_message(&chat, json!({ "message_id": 2, "type": "incoming" }))
            .unwrap();

        let messages = store.list_messages(&chat).await.unwrap();
        assert_eq!(messages, vec![Message::new(1, "ok", Direction::Incoming)]);
    }

    #[tokio::test]
    async fn test_outgoing_written_with_stored_token() {
        let store = MemoryStore::new();
        let chat = store.insert_conversation(1, "A").unwrap();
        store
            .append_message(&chat, &Message::new(0, "hi", Direction::Outgoing))
            .await
            .unwrap();

        let raw = store.raw_messages(&chat).unwrap();
        assert_eq!(raw[0]["type"], "outcoming");
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryStore::new();
        let chat = store.insert_conversation(1, "A").unwrap();
        store.set_available(false);

        assert!(matches!(
            store.list_conversations().await,
            Err(StoreError::Other(_))
        ));
        tokio_test::assert_err!(store.list_messages(&chat).await);
        tokio_test::assert_err!(
            store
                .append_message(&chat, &Message::new(0, "x", Direction::Outgoing))
                .await
        );

        store.set_available(true);
        let listed = tokio_test::assert_ok!(store.list_conversations().await);
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_reference_has_no_data() {
        let store = MemoryStore::new();
        let result = store.list_messages(&StoreRef::new("allChats/missing")).await;
        assert_eq!(result, Err(StoreError::NoData));
    }
}
