use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::protocol::Content;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Role name on the generateContent wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "model",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Chat log shown to the user. Append-only.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &Message {
        self.messages.push(Message::new(role, content));
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Prior turns in the form the text endpoint expects.
    pub fn history(&self) -> Vec<Content> {
        self.messages
            .iter()
            .map(|m| Content::text(Some(m.role.wire_name()), m.content.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_maps_assistant_to_model() {
        let mut log = Conversation::new();
        log.push(Role::Assistant, "Welcome!");
        log.push(Role::User, "When do admissions open?");

        let history = log.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role.as_deref(), Some("model"));
        assert_eq!(history[0].parts[0].text, "Welcome!");
        assert_eq!(history[1].role.as_deref(), Some("user"));
    }

    #[test]
    fn messages_keep_order_and_get_distinct_ids() {
        let mut log = Conversation::new();
        assert!(log.is_empty());
        let first = log.push(Role::User, "a").id;
        let second = log.push(Role::Assistant, "b").id;

        assert_ne!(first, second);
        let contents: Vec<&str> = log.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a", "b"]);
        assert!(log.messages()[0].timestamp <= log.messages()[1].timestamp);
    }

    #[test]
    fn message_serializes_with_lowercase_role() {
        let json = serde_json::to_value(Message::new(Role::Assistant, "hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }
}
