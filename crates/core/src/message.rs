//! Conversation domain types.
//!
//! A conversation is rebuilt for every inbound chat message from recent
//! channel history plus the current request, then extended with synthetic
//! turns as operations complete. It never outlives the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::OperationCall;

/// Who authored a conversation turn, from the provider's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Anyone other than the assistant, plus synthetic operation results
    User,
    /// The assistant itself
    Model,
}

/// One piece of a conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    /// Plain text
    Text(String),

    /// Small attachment sent inline, base64-encoded
    InlineData { mime_type: String, data: String },

    /// Attachment referenced by URI instead of being inlined
    FileReference { mime_type: String, uri: String },

    /// An operation call the model proposed in this turn
    Call(OperationCall),
}

impl Part {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// The text content, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// A single turn in the provider conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,

    /// Ordered parts of the turn
    pub parts: Vec<Part>,

    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    /// Create a user turn with a single text part.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(content)],
            timestamp: Utc::now(),
        }
    }

    /// Create a model turn with a single text part.
    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(content)],
            timestamp: Utc::now(),
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| match p {
            Part::Text(t) => t.trim().is_empty(),
            _ => false,
        })
    }
}

/// The ordered turns sent to the provider for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub entries: Vec<ConversationEntry>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, merging it into the previous one when the role repeats.
    ///
    /// Providers expect user and model turns to alternate.
    pub fn push(&mut self, entry: ConversationEntry) {
        match self.entries.last_mut() {
            Some(last) if last.role == entry.role => {
                last.parts.extend(entry.parts);
                last.timestamp = entry.timestamp;
            }
            _ => self.entries.push(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.entries.iter().map(|e| e.text().len() / 4).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_entry() {
        let entry = ConversationEntry::user("Hello, bot!");
        assert_eq!(entry.role, Role::User);
        assert_eq!(entry.text(), "Hello, bot!");
    }

    #[test]
    fn push_merges_consecutive_roles() {
        let mut conv = Conversation::new();
        conv.push(ConversationEntry::user("first"));
        conv.push(ConversationEntry::user("second"));
        conv.push(ConversationEntry::model("reply"));
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.entries[0].text(), "first\nsecond");
        assert_eq!(conv.entries[1].role, Role::Model);
    }

    #[test]
    fn blank_entry_is_empty() {
        let entry = ConversationEntry::user("   ");
        assert!(entry.is_empty());
        let with_file = ConversationEntry {
            role: Role::User,
            parts: vec![Part::FileReference {
                mime_type: "video/mp4".into(),
                uri: "https://cdn.example/clip.mp4".into(),
            }],
            timestamp: Utc::now(),
        };
        assert!(!with_file.is_empty());
    }

    #[test]
    fn conversation_token_estimate() {
        let mut conv = Conversation::new();
        conv.push(ConversationEntry::user("12345678901234567890"));
        assert_eq!(conv.estimated_tokens(), 5);
    }
}
