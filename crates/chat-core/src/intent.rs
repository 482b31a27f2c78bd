//! User intents forwarded by the presentation layer.

use serde::{Deserialize, Serialize};

use crate::model::ConversationId;

/// The only way the presentation layer may change session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    /// Reload the conversation list from the store.
    LoadConversationList,
    /// Make a conversation active and load its messages.
    SelectConversation { id: ConversationId },
    /// Leave the active conversation and start a blank thread.
    StartNewDraft,
    /// Send a message in the active conversation.
    SendMessage { text: String },
    /// Remove a conversation from the list.
    DeleteConversation { id: ConversationId },
}

impl Intent {
    /// Build a send intent.
    #[must_use]
    pub fn send(text: impl Into<String>) -> Self {
        Self::SendMessage { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_serialization() {
        let intent = Intent::SelectConversation { id: 12 };
        let json = serde_json::to_string(&intent).unwrap();
        assert!(json.contains("select_conversation"));

        let parsed: Intent = serde_json::from_str(&json).unwrap();
        if let Intent::SelectConversation { id } = parsed {
            assert_eq!(id, 12);
        } else {
            panic!("Wrong intent type");
        }
    }

    #[test]
    fn test_unit_intent_parses_from_tag_only() {
        let parsed: Intent = serde_json::from_str(r#"{"type":"start_new_draft"}"#).unwrap();
        assert_eq!(parsed, Intent::StartNewDraft);
    }
}
