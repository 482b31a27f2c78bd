//! Session manager: the single owner of session state.
//!
//! Intents from the presentation layer and results of remote calls are
//! queued on one channel and applied in order by a single task, so the
//! state never has more than one writer. Remote calls run on their own
//! tasks and report back through the same channel.

use std::{future::Future, sync::Arc};

use chat_core::{
    CompletionClient, ConversationId, ConversationRecord, EventStore, Intent, Message,
    MessageId, NetworkError, RemoteStore, SessionEvent, StoreError,
};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::state::{Effect, LoadTicket, SessionSnapshot, SessionState};

/// Session manager error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("Session has shut down")]
    Closed,
}

enum Command {
    Intent(Intent),
    ConversationsLoaded(Result<Vec<ConversationRecord>, StoreError>),
    MessagesLoaded {
        ticket: LoadTicket,
        result: Result<Vec<Message>, StoreError>,
    },
    MessagePersisted {
        conversation: ConversationId,
        message: MessageId,
        result: Result<(), StoreError>,
    },
    ReplyReceived {
        conversation: ConversationId,
        result: Result<String, NetworkError>,
    },
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// Handle to a running session.
///
/// Cheap to clone. The session stops once every handle is dropped; remote
/// calls already started still run to completion.
#[derive(Clone)]
pub struct SessionManager {
    commands: mpsc::UnboundedSender<Command>,
    events: Arc<EventStore>,
}

impl SessionManager {
    /// Start a session over the given store and completion client.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn<S, C>(store: Arc<S>, completion: Arc<C>) -> Self
    where
        S: RemoteStore + 'static,
        C: CompletionClient + 'static,
    {
        Self::spawn_with_events(store, completion, Arc::new(EventStore::new()))
    }

    /// Start a session publishing into an existing event store.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn_with_events<S, C>(store: Arc<S>, completion: Arc<C>, events: Arc<EventStore>) -> Self
    where
        S: RemoteStore + 'static,
        C: CompletionClient + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            state: SessionState::new(),
            store,
            completion,
            events: Arc::clone(&events),
            commands: tx.downgrade(),
        };
        tokio::spawn(actor.run(rx));

        Self {
            commands: tx,
            events,
        }
    }

    /// Forward a user intent.
    ///
    /// # Errors
    /// Returns error if the session has shut down.
    pub fn dispatch(&self, intent: Intent) -> Result<(), ManagerError> {
        self.commands
            .send(Command::Intent(intent))
            .map_err(|_| ManagerError::Closed)
    }

    /// Reload the conversation list.
    ///
    /// # Errors
    /// Returns error if the session has shut down.
    pub fn load_conversation_list(&self) -> Result<(), ManagerError> {
        self.dispatch(Intent::LoadConversationList)
    }

    /// Select a conversation.
    ///
    /// # Errors
    /// Returns error if the session has shut down.
    pub fn select_conversation(&self, id: ConversationId) -> Result<(), ManagerError> {
        self.dispatch(Intent::SelectConversation { id })
    }

    /// Start a new draft.
    ///
    /// # Errors
    /// Returns error if the session has shut down.
    pub fn start_new_draft(&self) -> Result<(), ManagerError> {
        self.dispatch(Intent::StartNewDraft)
    }

    /// Send a message in the active conversation.
    ///
    /// # Errors
    /// Returns error if the session has shut down.
    pub fn send_message(&self, text: impl Into<String>) -> Result<(), ManagerError> {
        self.dispatch(Intent::send(text))
    }

    /// Delete a conversation.
    ///
    /// # Errors
    /// Returns error if the session has shut down.
    pub fn delete_conversation(&self, id: ConversationId) -> Result<(), ManagerError> {
        self.dispatch(Intent::DeleteConversation { id })
    }

    /// Copy of the current state, taken after every queued command.
    ///
    /// # Errors
    /// Returns error if the session has shut down.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .map_err(|_| ManagerError::Closed)?;
        rx.await.map_err(|_| ManagerError::Closed)
    }

    /// Receiver for live notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The event store notifications are published to.
    #[must_use]
    pub fn events(&self) -> Arc<EventStore> {
        Arc::clone(&self.events)
    }
}

struct SessionActor<S, C> {
    state: SessionState,
    store: Arc<S>,
    completion: Arc<C>,
    events: Arc<EventStore>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl<S, C> SessionActor<S, C>
where
    S: RemoteStore + 'static,
    C: CompletionClient + 'static,
{
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        tracing::debug!("Session stopped");
    }

    fn handle(&mut self, command: Command) {
        let effects = match command {
            Command::Intent(intent) => self.handle_intent(intent),
            Command::ConversationsLoaded(result) => self.state.apply_conversations(result),
            Command::MessagesLoaded { ticket, result } => self.state.apply_messages(ticket, result),
            Command::MessagePersisted {
                conversation,
                message,
                result,
            } => {
                self.state.confirm_write(conversation, message, result);
                Vec::new()
            }
            Command::ReplyReceived {
                conversation,
                result,
            } => match result {
                Ok(text) => self.state.receive_reply(conversation, text),
                Err(e) => self.state.reply_failed(conversation, &e),
            },
            Command::Snapshot(tx) => {
                let _ = tx.send(self.state.snapshot());
                Vec::new()
            }
        };

        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn handle_intent(&mut self, intent: Intent) -> Vec<Effect> {
        tracing::debug!(?intent, "Intent");
        let result = match intent {
            Intent::LoadConversationList => Ok(self.state.request_conversation_list()),
            Intent::SelectConversation { id } => self.state.select_conversation(id),
            Intent::StartNewDraft => Ok(self.state.start_new_draft()),
            Intent::SendMessage { text } => Ok(self.state.send_message(text)),
            Intent::DeleteConversation { id } => self.state.delete_conversation(id),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!("Ignoring intent: {e}");
            Vec::new()
        })
    }

    fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::Notify(event) => self.events.push(event),
            Effect::LoadConversations => {
                let store = Arc::clone(&self.store);
                self.spawn_remote(async move {
                    Command::ConversationsLoaded(store.list_conversations().await)
                });
            }
            Effect::LoadMessages { ticket, reference } => {
                let store = Arc::clone(&self.store);
                self.spawn_remote(async move {
                    let result = store.list_messages(&reference).await;
                    Command::MessagesLoaded { ticket, result }
                });
            }
            Effect::PersistMessage {
                conversation,
                reference,
                message,
            } => {
                let store = Arc::clone(&self.store);
                self.spawn_remote(async move {
                    let result = store.append_message(&reference, &message).await;
                    Command::MessagePersisted {
                        conversation,
                        message: message.id,
                        result,
                    }
                });
            }
            Effect::GenerateReply {
                conversation,
                prompt,
            } => {
                let completion = Arc::clone(&self.completion);
                self.spawn_remote(async move {
                    let result = completion.generate_reply(&prompt).await;
                    Command::ReplyReceived {
                        conversation,
                        result,
                    }
                });
            }
        }
    }

    /// Run a remote call and queue its result back to this actor.
    ///
    /// The call always runs. Its result is dropped if the session has shut
    /// down by the time it completes.
    fn spawn_remote<F>(&self, call: F)
    where
        F: Future<Output = Command> + Send + 'static,
    {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let command = call.await;
            match commands.upgrade() {
                Some(tx) => {
                    let _ = tx.send(command);
                }
                None => tracing::debug!("Session closed, dropping remote result"),
            }
        });
    }
}
