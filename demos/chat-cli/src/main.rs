//! Terminal chat client.
//!
//! Run with: cargo run -p chat-cli
//!
//! Type a line to send it to the open conversation. Commands start with `/`;
//! `/help` lists them.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use chat_completion::HttpCompletionClient;
use chat_core::{
    ChatConfig, CheckStatus, CompletionClient, Direction, RemoteStore, SessionEvent, StoreBackend,
};
use chat_session::{ActiveConversation, SessionManager};
use chat_store::{FirestoreStore, MemoryStore};
use clap::{Parser, ValueEnum};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
/list          reload conversations
/open <id>     open a conversation
/new           start a new draft
/delete <id>   remove a conversation from the list
/show          print conversations and the open thread
/key <key>     check a completion API key
/quit          exit";

#[derive(Parser)]
#[command(name = "chat-cli")]
#[command(about = "Chat with a remote completion endpoint", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, env = "CHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured store backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Memory,
    Firestore,
}

impl From<Backend> for StoreBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Memory => Self::Memory,
            Backend::Firestore => Self::Firestore,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they don't interleave with the thread.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config =
        ChatConfig::load_or_default(cli.config.as_deref()).context("loading configuration")?;
    if let Some(backend) = cli.backend {
        config.store.backend = backend.into();
    }

    let completion = Arc::new(HttpCompletionClient::new(config.completion.clone()));

    match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store");
            run(Arc::new(seeded_memory_store()?), completion).await
        }
        StoreBackend::Firestore => {
            let store = FirestoreStore::new(&config.store)?;
            tracing::info!("Using Firestore store");
            run(Arc::new(store), completion).await
        }
    }
}

fn seeded_memory_store() -> Result<MemoryStore> {
    let store = MemoryStore::new();
    store.insert_conversation(1, "General")?;
    store.insert_conversation(2, "Ideas")?;
    Ok(store)
}

async fn run<S>(store: Arc<S>, completion: Arc<HttpCompletionClient>) -> Result<()>
where
    S: RemoteStore + 'static,
{
    let manager = SessionManager::spawn(store, Arc::clone(&completion));
    tokio::spawn(print_events(manager.clone()));

    manager.load_conversation_list()?;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();
        let outcome = match command {
            "/quit" => break,
            "/help" => {
                println!("{HELP}");
                Ok(())
            }
            "/list" => manager.load_conversation_list().map_err(Into::into),
            "/open" => parse_id(arg).and_then(|id| Ok(manager.select_conversation(id)?)),
            "/new" => manager.start_new_draft().map_err(Into::into),
            "/delete" => parse_id(arg).and_then(|id| Ok(manager.delete_conversation(id)?)),
            "/show" => show(&manager).await,
            "/key" => {
                check_key(completion.as_ref(), arg).await;
                Ok(())
            }
            _ if command.starts_with('/') => {
                println!("Unknown command {command}, try /help");
                Ok(())
            }
            _ => manager.send_message(line).map_err(Into::into),
        };

        if let Err(e) = outcome {
            println!("! {e}");
        }
    }

    Ok(())
}

fn parse_id(arg: &str) -> Result<i64> {
    if arg.is_empty() {
        bail!("missing conversation id");
    }
    arg.parse()
        .with_context(|| format!("invalid conversation id: {arg}"))
}

async fn check_key(completion: &impl CompletionClient, key: &str) {
    if key.is_empty() {
        println!("! missing key");
        return;
    }
    match completion.check_credential(key).await {
        CheckStatus::Valid => println!("Key accepted"),
        CheckStatus::Invalid => println!("Key rejected"),
        CheckStatus::Error => println!("Could not reach the endpoint"),
    }
}

async fn show(manager: &SessionManager) -> Result<()> {
    let snapshot = manager.snapshot().await?;

    for conversation in &snapshot.conversations {
        let marker = match snapshot.active {
            ActiveConversation::Bound(id) if id == conversation.id => '>',
            _ if conversation.has_unread => '*',
            _ => ' ',
        };
        println!(
            "{marker} [{}] {} ({} messages)",
            conversation.id, conversation.name, conversation.message_count
        );
    }

    if snapshot.active == ActiveConversation::Drafting {
        println!("-- new draft --");
    }
    for message in &snapshot.messages {
        println!("{}", format_message(message.direction, &message.text));
    }
    if !snapshot.pending_writes.is_empty() {
        println!("({} unsaved)", snapshot.pending_writes.len());
    }
    for (id, count) in &snapshot.held_messages {
        println!("({count} waiting for [{id}] to load)");
    }
    Ok(())
}

fn format_message(direction: Direction, text: &str) -> String {
    match direction {
        Direction::Outgoing => format!("  you: {text}"),
        Direction::Incoming => format!("  bot: {text}"),
    }
}

async fn print_events(manager: SessionManager) {
    let mut events = manager.subscribe();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        tracing::debug!(kind = event.kind(), "Event");

        match event {
            SessionEvent::ConversationListReplaced { conversations } => {
                println!("{} conversations", conversations.len());
                for c in conversations {
                    println!("  [{}] {}", c.id, c.name);
                }
            }
            SessionEvent::ConversationRowUpdated { id } => {
                let Ok(snapshot) = manager.snapshot().await else {
                    break;
                };
                let unread = snapshot
                    .conversations
                    .iter()
                    .any(|c| c.id == id && c.has_unread);
                if unread {
                    println!("* new reply in [{id}]");
                }
            }
            SessionEvent::ConversationRemoved { id } => println!("Removed [{id}]"),
            SessionEvent::ThreadReplaced { messages } => {
                for message in messages {
                    println!("{}", format_message(message.direction, &message.text));
                }
            }
            SessionEvent::MessageInserted {
                index,
                direction: Direction::Incoming,
            } => {
                let Ok(snapshot) = manager.snapshot().await else {
                    break;
                };
                if let Some(message) = snapshot.messages.get(index) {
                    println!("{}", format_message(message.direction, &message.text));
                }
            }
            SessionEvent::ErrorOccurred { message } => println!("! {message}"),
            SessionEvent::MessageInserted { .. }
            | SessionEvent::ScrollToMessage { .. }
            | SessionEvent::CloseOverlay => {}
        }
    }
}
