//! Session state machine.
//!
//! `SessionState` is plain data with synchronous transitions. Each
//! transition returns the [`Effect`]s it needs: notifications for the
//! presentation layer and remote calls for the driver to run. Results of
//! remote calls come back in through the `apply_*` / `receive_*` methods.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chat_core::{
    Conversation, ConversationId, ConversationRecord, Direction, Message, MessageId,
    NetworkError, SessionEvent, StoreError, StoreRef, model::sort_messages,
};
use serde::Serialize;

/// Which conversation the thread view is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum ActiveConversation {
    /// No persisted conversation selected; a new thread is being drafted.
    #[default]
    Drafting,
    /// Bound to an existing conversation.
    Bound(ConversationId),
}

/// Identifies one message load. Only the most recent ticket is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub conversation: ConversationId,
    generation: u64,
}

/// Work requested by a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Tell the presentation layer about a committed change.
    Notify(SessionEvent),
    /// Fetch the conversation list.
    LoadConversations,
    /// Fetch one conversation's messages.
    LoadMessages {
        ticket: LoadTicket,
        reference: StoreRef,
    },
    /// Append a message to the store without waiting on the outcome.
    PersistMessage {
        conversation: ConversationId,
        reference: StoreRef,
        message: Message,
    },
    /// Ask the completion endpoint for a reply.
    GenerateReply {
        conversation: ConversationId,
        prompt: String,
    },
}

/// A message accepted before its conversation's ids were known.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeldMessage {
    text: String,
    direction: Direction,
}

/// Session error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),
}

/// Read-only copy of the session handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub active: ActiveConversation,
    /// Ordered by id, ascending.
    pub conversations: Vec<Conversation>,
    /// Messages of the active conversation.
    pub messages: Vec<Message>,
    /// Appends not yet confirmed by the store.
    pub pending_writes: Vec<(ConversationId, MessageId)>,
    /// Messages waiting for their conversation to load, per conversation.
    pub held_messages: Vec<(ConversationId, usize)>,
}

/// In-memory source of truth for the chat client.
#[derive(Debug, Default)]
pub struct SessionState {
    conversations: BTreeMap<ConversationId, Conversation>,
    references: HashMap<ConversationId, StoreRef>,
    active: ActiveConversation,
    loaded_messages: Vec<Message>,
    pending_writes: BTreeSet<(ConversationId, MessageId)>,
    held: BTreeMap<ConversationId, Vec<HeldMessage>>,
    /// Conversations whose message ids were read from the store.
    synced: HashSet<ConversationId>,
    load_generation: u64,
    current_load: Option<LoadTicket>,
}

impl SessionState {
    /// Create an empty session in the drafting state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn active(&self) -> ActiveConversation {
        self.active
    }

    #[must_use]
    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.get(&id)
    }

    /// Conversations ordered by id.
    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    #[must_use]
    pub fn loaded_messages(&self) -> &[Message] {
        &self.loaded_messages
    }

    #[must_use]
    pub fn is_pending(&self, conversation: ConversationId, message: MessageId) -> bool {
        self.pending_writes.contains(&(conversation, message))
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            active: self.active,
            conversations: self.conversations.values().cloned().collect(),
            messages: self.loaded_messages.clone(),
            pending_writes: self.pending_writes.iter().copied().collect(),
            held_messages: self.held.iter().map(|(id, held)| (*id, held.len())).collect(),
        }
    }

    /// Start a bulk load of the conversation list.
    #[must_use]
    pub fn request_conversation_list(&self) -> Vec<Effect> {
        vec![Effect::LoadConversations]
    }

    /// Apply the result of a conversation list load.
    ///
    /// The list is replaced wholesale. Local counters survive for ids present
    /// in both lists. If the active conversation disappeared, the session
    /// falls back to drafting.
    pub fn apply_conversations(
        &mut self,
        result: Result<Vec<ConversationRecord>, StoreError>,
    ) -> Vec<Effect> {
        let records = match result {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Failed to load conversations: {e}");
                return Vec::new();
            }
        };

        let mut previous = std::mem::take(&mut self.conversations);
        self.references.clear();

        for record in records {
            let conversation = previous.remove(&record.id).map_or_else(
                || Conversation::new(record.id, record.name.clone()),
                |old| Conversation {
                    name: record.name.clone(),
                    ..old
                },
            );
            self.conversations.insert(record.id, conversation);
            self.references.insert(record.id, record.reference);
        }
        self.held.retain(|id, _| self.conversations.contains_key(id));
        self.synced.retain(|id| self.conversations.contains_key(id));
        tracing::debug!(count = self.conversations.len(), "Conversation list replaced");

        let mut effects = vec![Effect::Notify(SessionEvent::ConversationListReplaced {
            conversations: self.conversations.values().cloned().collect(),
        })];

        if let ActiveConversation::Bound(id) = self.active {
            if !self.conversations.contains_key(&id) {
                tracing::debug!(id, "Active conversation no longer listed");
                self.enter_draft();
                effects.push(Effect::Notify(SessionEvent::ThreadReplaced {
                    messages: Vec::new(),
                }));
            }
        }

        effects
    }

    /// Make `id` the active conversation and start loading its messages.
    ///
    /// The unread flag is cleared right away, before the load completes.
    ///
    /// # Errors
    /// Returns error if the conversation is not known.
    pub fn select_conversation(&mut self, id: ConversationId) -> Result<Vec<Effect>, SessionError> {
        let reference = self
            .references
            .get(&id)
            .cloned()
            .ok_or(SessionError::UnknownConversation(id))?;
        let conversation = self
            .conversations
            .get_mut(&id)
            .ok_or(SessionError::UnknownConversation(id))?;

        conversation.has_unread = false;
        self.active = ActiveConversation::Bound(id);
        self.loaded_messages.clear();

        self.load_generation += 1;
        let ticket = LoadTicket {
            conversation: id,
            generation: self.load_generation,
        };
        self.current_load = Some(ticket);

        Ok(vec![
            Effect::Notify(SessionEvent::ConversationRowUpdated { id }),
            Effect::Notify(SessionEvent::ThreadReplaced {
                messages: Vec::new(),
            }),
            Effect::Notify(SessionEvent::CloseOverlay),
            Effect::LoadMessages { ticket, reference },
        ])
    }

    /// Apply the result of a message load.
    ///
    /// Results for anything but the latest load are discarded. Messages held
    /// while the load was in flight are numbered after the stored ones, then
    /// shown and persisted.
    pub fn apply_messages(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<Message>, StoreError>,
    ) -> Vec<Effect> {
        if self.current_load != Some(ticket) {
            tracing::debug!(
                conversation = ticket.conversation,
                "Discarding stale message load"
            );
            return Vec::new();
        }
        self.current_load = None;
        let conversation = ticket.conversation;

        let mut messages = match result {
            Ok(messages) => messages,
            Err(e) => {
                let held = self.held.get(&conversation).map_or(0, Vec::len);
                tracing::warn!(conversation, held, "Failed to load messages: {e}");
                return Vec::new();
            }
        };
        sort_messages(&mut messages);
        self.synced.insert(conversation);

        let mut next_id = self.next_message_id(conversation, &messages);
        self.loaded_messages = messages;

        let mut effects = vec![Effect::Notify(SessionEvent::ThreadReplaced {
            messages: self.loaded_messages.clone(),
        })];

        // Messages accepted during the load go after everything stored.
        for held in self.held.remove(&conversation).unwrap_or_default() {
            let message = Message::new(next_id, held.text, held.direction);
            next_id += 1;
            effects.extend(self.push_to_thread(conversation, message));
        }
        if let Some(entry) = self.conversations.get_mut(&conversation) {
            entry.message_count = next_id;
        }

        if let Some(last) = self.loaded_messages.len().checked_sub(1) {
            effects.push(Effect::Notify(SessionEvent::ScrollToMessage { index: last }));
        }
        effects
    }

    /// Leave the active conversation and show a blank thread.
    pub fn start_new_draft(&mut self) -> Vec<Effect> {
        self.enter_draft();
        vec![
            Effect::Notify(SessionEvent::ThreadReplaced {
                messages: Vec::new(),
            }),
            Effect::Notify(SessionEvent::CloseOverlay),
        ]
    }

    /// Send a message in the active conversation.
    ///
    /// While drafting there is no conversation to send into, and the text is
    /// discarded. While the conversation's messages are still loading the
    /// message is held and appended once they arrive; the reply is requested
    /// right away.
    pub fn send_message(&mut self, text: String) -> Vec<Effect> {
        let ActiveConversation::Bound(id) = self.active else {
            tracing::debug!("No active conversation, discarding message");
            return Vec::new();
        };

        let mut effects = if self.awaiting_load(id) {
            self.hold(id, text.clone(), Direction::Outgoing);
            Vec::new()
        } else {
            let effects = self.append_to_active(id, text.clone(), Direction::Outgoing);
            if effects.is_empty() {
                return effects;
            }
            effects
        };
        effects.push(Effect::GenerateReply {
            conversation: id,
            prompt: text,
        });
        effects
    }

    /// A reply arrived for `conversation`.
    ///
    /// If that conversation is not on screen the reply is still counted and
    /// persisted, and the conversation is flagged unread.
    pub fn receive_reply(&mut self, conversation: ConversationId, text: String) -> Vec<Effect> {
        if !self.conversations.contains_key(&conversation) {
            tracing::debug!(conversation, "Dropping reply for removed conversation");
            return Vec::new();
        }
        let active = self.active == ActiveConversation::Bound(conversation);

        if self.awaiting_load(conversation) {
            self.hold(conversation, text, Direction::Incoming);
            if active {
                return Vec::new();
            }
            if let Some(entry) = self.conversations.get_mut(&conversation) {
                entry.has_unread = true;
            }
            return vec![Effect::Notify(SessionEvent::ConversationRowUpdated {
                id: conversation,
            })];
        }

        if active {
            return self.append_to_active(conversation, text, Direction::Incoming);
        }

        let Some(entry) = self.conversations.get_mut(&conversation) else {
            return Vec::new();
        };

        let message = Message::new(entry.message_count, text, Direction::Incoming);
        entry.message_count += 1;
        entry.has_unread = true;

        let mut effects = vec![Effect::Notify(SessionEvent::ConversationRowUpdated {
            id: conversation,
        })];
        effects.extend(self.persist(conversation, message));
        effects
    }

    /// Reply generation failed. This is the one failure shown to the user.
    #[must_use]
    pub fn reply_failed(&self, conversation: ConversationId, error: &NetworkError) -> Vec<Effect> {
        tracing::warn!(conversation, "Reply generation failed: {error}");
        vec![Effect::Notify(SessionEvent::ErrorOccurred {
            message: error.to_string(),
        })]
    }

    /// Record the store's answer to an append.
    ///
    /// Failed appends stay pending. Nothing is retried or rolled back.
    pub fn confirm_write(
        &mut self,
        conversation: ConversationId,
        message: MessageId,
        result: Result<(), StoreError>,
    ) {
        match result {
            Ok(()) => {
                self.pending_writes.remove(&(conversation, message));
                tracing::debug!(conversation, message, "Message saved");
            }
            Err(e) => {
                tracing::warn!(conversation, message, "Failed to save message: {e}");
            }
        }
    }

    /// Remove a conversation from the list.
    ///
    /// # Errors
    /// Returns error if the conversation is not known.
    pub fn delete_conversation(&mut self, id: ConversationId) -> Result<Vec<Effect>, SessionError> {
        if self.conversations.remove(&id).is_none() {
            return Err(SessionError::UnknownConversation(id));
        }
        self.references.remove(&id);
        self.synced.remove(&id);
        if let Some(held) = self.held.remove(&id) {
            tracing::debug!(id, dropped = held.len(), "Dropping held messages");
        }

        let mut effects = vec![Effect::Notify(SessionEvent::ConversationRemoved { id })];
        if self.active == ActiveConversation::Bound(id) {
            self.enter_draft();
            effects.push(Effect::Notify(SessionEvent::ThreadReplaced {
                messages: Vec::new(),
            }));
        }
        Ok(effects)
    }

    fn enter_draft(&mut self) {
        self.active = ActiveConversation::Drafting;
        self.loaded_messages.clear();
        self.current_load = None;
    }

    fn append_to_active(
        &mut self,
        id: ConversationId,
        text: String,
        direction: Direction,
    ) -> Vec<Effect> {
        let Some(conversation) = self.conversations.get_mut(&id) else {
            tracing::error!(id, "Active conversation missing from list");
            return Vec::new();
        };

        let message = Message::new(conversation.message_count, text, direction);
        conversation.message_count += 1;

        self.push_to_thread(id, message)
    }

    fn push_to_thread(&mut self, id: ConversationId, message: Message) -> Vec<Effect> {
        let index = self.loaded_messages.len();
        let direction = message.direction;
        self.loaded_messages.push(message.clone());

        let mut effects = vec![Effect::Notify(SessionEvent::MessageInserted {
            index,
            direction,
        })];
        effects.extend(self.persist(id, message));
        effects
    }

    /// Whether new messages for `id` must wait for a load to number them.
    fn awaiting_load(&self, id: ConversationId) -> bool {
        !self.synced.contains(&id) || self.current_load.is_some_and(|t| t.conversation == id)
    }

    fn hold(&mut self, id: ConversationId, text: String, direction: Direction) {
        tracing::debug!(id, ?direction, "Holding message until messages load");
        self.held
            .entry(id)
            .or_default()
            .push(HeldMessage { text, direction });
    }

    /// First id not taken by the loaded list or an unconfirmed append.
    fn next_message_id(&self, conversation: ConversationId, loaded: &[Message]) -> MessageId {
        let after_loaded = loaded
            .last()
            .map_or(0, |m| m.id.saturating_add(1))
            .max(loaded.len() as u64);
        let after_pending = self
            .pending_writes
            .range((conversation, 0)..=(conversation, MessageId::MAX))
            .next_back()
            .map_or(0, |(_, id)| id.saturating_add(1));
        after_loaded.max(after_pending)
    }

    fn persist(&mut self, conversation: ConversationId, message: Message) -> Option<Effect> {
        let reference = self.references.get(&conversation)?.clone();
        self.pending_writes.insert((conversation, message.id));
        Some(Effect::PersistMessage {
            conversation,
            reference,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: ConversationId, name: &str) -> ConversationRecord {
        ConversationRecord {
            id,
            name: name.to_string(),
            reference: StoreRef::new(format!("allChats/{id}")),
        }
    }

    fn loaded(records: Vec<ConversationRecord>) -> SessionState {
        let mut state = SessionState::new();
        state.apply_conversations(Ok(records));
        state
    }

    fn load_ticket(effects: &[Effect]) -> LoadTicket {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::LoadMessages { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .expect("select should request a load")
    }

    fn messages(count: u64) -> Vec<Message> {
        (0..count)
            .map(|id| Message::new(id, format!("m{id}"), Direction::Incoming))
            .collect()
    }

    /// Bound to `id` with `count` messages loaded.
    fn bound(id: ConversationId, count: u64) -> SessionState {
        let mut state = loaded(vec![record(1, "A"), record(2, "B")]);
        let ticket = load_ticket(&state.select_conversation(id).unwrap());
        state.apply_messages(ticket, Ok(messages(count)));
        state
    }

    #[test]
    fn test_conversations_presented_by_id() {
        let mut state = SessionState::new();
        let effects = state.apply_conversations(Ok(vec![record(2, "B"), record(1, "A")]));

        let Effect::Notify(SessionEvent::ConversationListReplaced { conversations }) = &effects[0]
        else {
            panic!("expected list replacement, got {effects:?}");
        };
        let listed: Vec<_> = conversations.iter().map(|c| (c.id, c.name.as_str())).collect();
        assert_eq!(listed, vec![(1, "A"), (2, "B")]);
    }

    #[test]
    fn test_sparse_ids() {
        let state = loaded(vec![record(40, "X"), record(7, "Y")]);
        assert!(state.conversation(7).is_some());
        assert!(state.conversation(40).is_some());
        assert!(state.conversation(0).is_none());
    }

    #[test]
    fn test_failed_list_keeps_prior_state() {
        let mut state = loaded(vec![record(1, "A")]);
        let effects = state.apply_conversations(Err(StoreError::NoData));
        assert!(effects.is_empty());
        assert_eq!(state.conversations().count(), 1);
    }

    #[test]
    fn test_select_clears_unread_before_load() {
        let mut state = loaded(vec![record(1, "A"), record(2, "B")]);
        state.receive_reply(1, "ping".to_string());
        assert!(state.conversation(1).unwrap().has_unread);

        let effects = tokio_test::assert_ok!(state.select_conversation(1));
        assert!(!state.conversation(1).unwrap().has_unread);
        assert_eq!(
            effects[0],
            Effect::Notify(SessionEvent::ConversationRowUpdated { id: 1 })
        );
        assert!(effects.contains(&Effect::Notify(SessionEvent::CloseOverlay)));

        // A failing load does not bring the flag back.
        state.apply_messages(load_ticket(&effects), Err(StoreError::Other("down".into())));
        assert!(!state.conversation(1).unwrap().has_unread);
    }

    #[test]
    fn test_select_unknown_conversation() {
        let mut state = loaded(vec![record(1, "A")]);
        assert_eq!(
            state.select_conversation(9),
            Err(SessionError::UnknownConversation(9))
        );
        assert_eq!(state.active(), ActiveConversation::Drafting);
    }

    #[test]
    fn test_stale_load_is_discarded() {
        let mut state = loaded(vec![record(1, "A"), record(2, "B")]);
        let ticket_a = load_ticket(&state.select_conversation(1).unwrap());
        let ticket_b = load_ticket(&state.select_conversation(2).unwrap());

        let b_messages = vec![Message::new(0, "from b", Direction::Incoming)];
        state.apply_messages(ticket_b, Ok(b_messages.clone()));
        let effects = state.apply_messages(ticket_a, Ok(messages(5)));

        assert!(effects.is_empty());
        assert_eq!(state.loaded_messages(), b_messages.as_slice());
        assert_eq!(state.conversation(1).unwrap().message_count, 0);
        assert_eq!(state.conversation(2).unwrap().message_count, 1);
    }

    #[test]
    fn test_reselecting_same_conversation_uses_latest_load() {
        let mut state = loaded(vec![record(1, "A"), record(2, "B")]);
        let first = load_ticket(&state.select_conversation(1).unwrap());
        let second = load_ticket(&state.select_conversation(1).unwrap());

        assert!(state.apply_messages(first, Ok(messages(1))).is_empty());
        assert!(!state.apply_messages(second, Ok(messages(2))).is_empty());
        assert_eq!(state.loaded_messages().len(), 2);
    }

    #[test]
    fn test_load_sets_count_and_scrolls_to_last() {
        let mut state = loaded(vec![record(1, "A")]);
        let ticket = load_ticket(&state.select_conversation(1).unwrap());
        let effects = state.apply_messages(ticket, Ok(messages(3)));

        assert_eq!(state.conversation(1).unwrap().message_count, 3);
        assert_eq!(
            effects.last(),
            Some(&Effect::Notify(SessionEvent::ScrollToMessage { index: 2 }))
        );
    }

    #[test]
    fn test_empty_load_does_not_scroll() {
        let mut state = loaded(vec![record(1, "A")]);
        let ticket = load_ticket(&state.select_conversation(1).unwrap());
        let effects = state.apply_messages(ticket, Ok(Vec::new()));
        assert_eq!(
            effects,
            vec![Effect::Notify(SessionEvent::ThreadReplaced {
                messages: Vec::new()
            })]
        );
    }

    #[test]
    fn test_send_while_drafting_is_discarded() {
        let mut state = loaded(vec![record(1, "A")]);
        let effects = state.send_message("lost".to_string());

        assert!(effects.is_empty());
        assert!(state.loaded_messages().is_empty());
        assert_eq!(state.conversation(1).unwrap().message_count, 0);
    }

    #[test]
    fn test_send_while_bound() {
        let mut state = bound(1, 3);
        let effects = state.send_message("hi".to_string());

        let expected = Message::new(3, "hi", Direction::Outgoing);
        assert_eq!(state.conversation(1).unwrap().message_count, 4);
        assert_eq!(state.loaded_messages().last(), Some(&expected));
        assert_eq!(
            effects,
            vec![
                Effect::Notify(SessionEvent::MessageInserted {
                    index: 3,
                    direction: Direction::Outgoing
                }),
                Effect::PersistMessage {
                    conversation: 1,
                    reference: StoreRef::new("allChats/1"),
                    message: expected,
                },
                Effect::GenerateReply {
                    conversation: 1,
                    prompt: "hi".to_string()
                },
            ]
        );
        assert!(state.is_pending(1, 3));
    }

    #[test]
    fn test_reply_for_active_conversation_appends() {
        let mut state = bound(1, 1);
        state.send_message("hi".to_string());
        let effects = state.receive_reply(1, "hello".to_string());

        assert_eq!(
            state.loaded_messages().last(),
            Some(&Message::new(2, "hello", Direction::Incoming))
        );
        assert_eq!(state.conversation(1).unwrap().message_count, 3);
        assert!(!state.conversation(1).unwrap().has_unread);
        assert!(matches!(effects[1], Effect::PersistMessage { .. }));
    }

    #[test]
    fn test_reply_for_background_conversation_marks_unread() {
        let mut state = bound(1, 2);
        state.send_message("hi".to_string());
        let ticket = load_ticket(&state.select_conversation(2).unwrap());
        state.apply_messages(ticket, Ok(messages(1)));
        let before = state.loaded_messages().to_vec();

        let effects = state.receive_reply(1, "late".to_string());

        assert_eq!(state.loaded_messages(), before.as_slice());
        let chat = state.conversation(1).unwrap();
        assert!(chat.has_unread);
        assert_eq!(chat.message_count, 4);
        assert_eq!(
            effects[0],
            Effect::Notify(SessionEvent::ConversationRowUpdated { id: 1 })
        );
        assert!(matches!(
            &effects[1],
            Effect::PersistMessage { message, .. } if message.id == 3
        ));
    }

    #[test]
    fn test_reply_for_deleted_conversation_is_dropped() {
        let mut state = bound(1, 0);
        state.send_message("hi".to_string());
        state.delete_conversation(1).unwrap();
        assert!(state.receive_reply(1, "late".to_string()).is_empty());
    }

    #[test]
    fn test_reply_failure_surfaces_error() {
        let state = bound(1, 0);
        let effects = state.reply_failed(1, &NetworkError::NoData);
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            &effects[0],
            Effect::Notify(SessionEvent::ErrorOccurred { .. })
        ));
    }

    #[test]
    fn test_failed_write_stays_pending() {
        let mut state = bound(1, 0);
        state.send_message("a".to_string());
        state.send_message("b".to_string());

        state.confirm_write(1, 0, Ok(()));
        state.confirm_write(1, 1, Err(StoreError::Other("offline".into())));

        assert!(!state.is_pending(1, 0));
        assert!(state.is_pending(1, 1));
        // The optimistic append is kept.
        assert_eq!(state.loaded_messages().len(), 2);
    }

    #[test]
    fn test_new_draft_clears_thread_and_ignores_late_load() {
        let mut state = loaded(vec![record(1, "A")]);
        let ticket = load_ticket(&state.select_conversation(1).unwrap());
        state.start_new_draft();

        assert_eq!(state.active(), ActiveConversation::Drafting);
        assert!(state.apply_messages(ticket, Ok(messages(2))).is_empty());
        assert!(state.loaded_messages().is_empty());
    }

    #[test]
    fn test_delete_active_conversation_returns_to_draft() {
        let mut state = bound(2, 2);
        let effects = state.delete_conversation(2).unwrap();

        assert_eq!(state.active(), ActiveConversation::Drafting);
        assert!(state.loaded_messages().is_empty());
        assert!(state.conversation(2).is_none());
        assert_eq!(
            effects[0],
            Effect::Notify(SessionEvent::ConversationRemoved { id: 2 })
        );
    }

    #[test]
    fn test_delete_background_conversation_keeps_thread() {
        let mut state = bound(2, 2);
        state.delete_conversation(1).unwrap();

        assert_eq!(state.active(), ActiveConversation::Bound(2));
        assert_eq!(state.loaded_messages().len(), 2);
        assert_eq!(
            state.delete_conversation(1),
            Err(SessionError::UnknownConversation(1))
        );
    }

    #[test]
    fn test_reload_keeps_counters_and_drops_missing_active() {
        let mut state = bound(1, 3);
        state.receive_reply(2, "x".to_string());

        state.apply_conversations(Ok(vec![record(1, "A renamed"), record(2, "B")]));
        assert_eq!(state.conversation(1).unwrap().message_count, 3);
        assert_eq!(state.conversation(1).unwrap().name, "A renamed");
        assert!(state.conversation(2).unwrap().has_unread);

        state.apply_conversations(Ok(vec![record(2, "B")]));
        assert_eq!(state.active(), ActiveConversation::Drafting);
        assert!(state.loaded_messages().is_empty());
    }

    #[test]
    fn test_send_and_reply_during_load_follow_stored_messages() {
        let mut state = loaded(vec![record(1, "A")]);
        let ticket = load_ticket(&state.select_conversation(1).unwrap());

        let effects = state.send_message("hi".to_string());
        assert_eq!(
            effects,
            vec![Effect::GenerateReply {
                conversation: 1,
                prompt: "hi".to_string()
            }]
        );
        assert!(state.receive_reply(1, "hello".to_string()).is_empty());
        assert!(state.loaded_messages().is_empty());
        assert_eq!(state.snapshot().held_messages, vec![(1, 2)]);

        let effects = state.apply_messages(ticket, Ok(messages(3)));

        assert_eq!(
            &state.loaded_messages()[3..],
            &[
                Message::new(3, "hi", Direction::Outgoing),
                Message::new(4, "hello", Direction::Incoming),
            ]
        );
        assert_eq!(state.conversation(1).unwrap().message_count, 5);
        assert!(state.is_pending(1, 3));
        assert!(state.is_pending(1, 4));
        assert!(state.snapshot().held_messages.is_empty());
        assert_eq!(
            effects[1],
            Effect::Notify(SessionEvent::MessageInserted {
                index: 3,
                direction: Direction::Outgoing
            })
        );
        assert_eq!(
            effects.last(),
            Some(&Effect::Notify(SessionEvent::ScrollToMessage { index: 4 }))
        );
    }

    #[test]
    fn test_failed_load_keeps_held_messages() {
        let mut state = loaded(vec![record(1, "A")]);
        let ticket = load_ticket(&state.select_conversation(1).unwrap());
        state.send_message("hi".to_string());

        assert!(state.apply_messages(ticket, Err(StoreError::NoData)).is_empty());
        assert_eq!(state.snapshot().held_messages, vec![(1, 1)]);
        assert!(state.snapshot().pending_writes.is_empty());

        // Still unknown ids, so later sends wait too.
        state.send_message("again".to_string());
        let ticket = load_ticket(&state.select_conversation(1).unwrap());
        state.apply_messages(ticket, Ok(messages(2)));

        let texts: Vec<_> = state
            .loaded_messages()
            .iter()
            .map(|m| (m.id, m.text.as_str()))
            .collect();
        assert_eq!(texts, vec![(0, "m0"), (1, "m1"), (2, "hi"), (3, "again")]);
    }

    #[test]
    fn test_reload_numbers_after_unconfirmed_writes() {
        let mut state = bound(1, 2);
        state.send_message("a".to_string());
        assert!(state.is_pending(1, 2));

        let ticket = load_ticket(&state.select_conversation(1).unwrap());
        state.send_message("b".to_string());
        // The store has not seen "a" yet.
        state.apply_messages(ticket, Ok(messages(2)));

        assert_eq!(
            state.loaded_messages().last(),
            Some(&Message::new(3, "b", Direction::Outgoing))
        );
        assert_eq!(state.conversation(1).unwrap().message_count, 4);
    }

    #[test]
    fn test_reply_for_unloaded_background_conversation_is_held() {
        let mut state = bound(1, 1);

        let effects = state.receive_reply(2, "x".to_string());
        assert_eq!(
            effects,
            vec![Effect::Notify(SessionEvent::ConversationRowUpdated { id: 2 })]
        );
        assert!(state.conversation(2).unwrap().has_unread);
        assert_eq!(state.snapshot().held_messages, vec![(2, 1)]);

        let ticket = load_ticket(&state.select_conversation(2).unwrap());
        let effects = state.apply_messages(ticket, Ok(messages(1)));
        assert!(effects.contains(&Effect::PersistMessage {
            conversation: 2,
            reference: StoreRef::new("allChats/2"),
            message: Message::new(1, "x", Direction::Incoming),
        }));
    }
}
