use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: Role,
    pub content: String,
}

/// Prior turns replayed verbatim to the model, in insertion order.
///
/// Entries are only ever appended; the whole log may be cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    entries: Vec<ContextEntry>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.entries.push(ContextEntry {
            role: Role::User,
            content: content.into(),
        });
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.entries.push(ContextEntry {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One user question. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct Question {
    text: String,
    turn_index: u64,
    asked_at: DateTime<Utc>,
}

impl Question {
    pub fn new(text: impl Into<String>, turn_index: u64) -> Self {
        Self {
            text: text.into(),
            turn_index,
            asked_at: Utc::now(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn turn_index(&self) -> u64 {
        self.turn_index
    }

    pub fn asked_at(&self) -> DateTime<Utc> {
        self.asked_at
    }
}
