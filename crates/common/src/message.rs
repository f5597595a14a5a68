//! Conversational records attached to a run's shared state.

use serde::{Deserialize, Serialize};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One entry in a run's ordered message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the author
    pub role: MessageRole,

    /// Message content
    pub content: String,

    /// Timestamp (Unix millis)
    pub timestamp: u64,

    /// Producing agent, when the author is an agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: now_millis(),
            agent: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            timestamp: now_millis(),
            agent: None,
        }
    }

    pub fn from_agent(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: now_millis(),
            agent: Some(agent.into()),
        }
    }
}

/// Current time as Unix epoch milliseconds.
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let user = Message::user("hello");
        assert_eq!(user.role, MessageRole::User);
        assert!(user.agent.is_none());
        assert!(user.timestamp > 0);

        let agent = Message::from_agent("triage_agent", "classified");
        assert_eq!(agent.role, MessageRole::Assistant);
        assert_eq!(agent.agent.as_deref(), Some("triage_agent"));
    }

    #[test]
    fn test_role_wire_names() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
