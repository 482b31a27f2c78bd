//! Session state and orchestration for the chat client.
//!
//! Provides:
//! - `SessionState` - the state machine behind the sidebar and thread view
//! - `SessionManager` - single-writer driver running remote calls

pub mod manager;
pub mod state;

pub use manager::{ManagerError, SessionManager};
pub use state::{ActiveConversation, Effect, SessionError, SessionSnapshot, SessionState};
