//! Chat surface trait: the abstraction over the chat platform.
//!
//! The orchestrator never touches the network. It reads the originating
//! message and recent history through a [`ChatSurface`] and posts or edits
//! messages through it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// The inbound chat message that starts an orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginMessage {
    /// Platform message id
    pub id: String,

    pub channel_id: String,

    /// Server (guild) id; `None` in direct messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,

    pub author_id: String,

    /// Display name of the author
    pub author_name: String,

    /// The request text, with the bot mention already stripped
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    pub timestamp: DateTime<Utc>,
}

/// A message from recent channel history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub author_id: String,
    pub author_name: String,

    /// Whether the assistant itself wrote this message
    #[serde(default)]
    pub from_assistant: bool,

    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    pub timestamp: DateTime<Utc>,
}

/// An attachment on a chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Download URL
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl Attachment {
    /// Filename if known, otherwise the last URL path segment.
    pub fn display_name(&self) -> &str {
        self.filename
            .as_deref()
            .unwrap_or_else(|| self.url.rsplit('/').next().unwrap_or(&self.url))
    }
}

/// A message the assistant has posted and may edit later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedMessage {
    pub channel_id: String,
    pub message_id: String,
}

/// The message-like handle the orchestrator talks through.
///
/// Implementations handle platform formatting, rate limits and
/// authentication.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// The message that started this run.
    fn origin(&self) -> &OriginMessage;

    /// Maximum characters a single message may carry.
    fn display_limit(&self) -> usize {
        2000
    }

    /// Reply to the origin message.
    async fn reply(&self, content: &str) -> std::result::Result<PostedMessage, PlatformError>;

    /// Replace the content of a previously posted message.
    async fn edit(
        &self,
        message: &PostedMessage,
        content: &str,
    ) -> std::result::Result<(), PlatformError>;

    /// Post to an arbitrary channel (used when the origin channel was replaced).
    async fn send_to_channel(
        &self,
        channel_id: &str,
        content: &str,
    ) -> std::result::Result<PostedMessage, PlatformError>;

    /// Recent messages in the origin channel, oldest first, excluding the
    /// origin message itself.
    async fn recent_history(
        &self,
        _limit: usize,
    ) -> std::result::Result<Vec<HistoryMessage>, PlatformError> {
        Ok(Vec::new())
    }

    /// Download an attachment's bytes.
    async fn fetch_attachment(
        &self,
        attachment: &Attachment,
    ) -> std::result::Result<Vec<u8>, PlatformError> {
        Err(PlatformError::AttachmentUnavailable(
            attachment.display_name().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_display_name_falls_back_to_url() {
        let named = Attachment {
            url: "https://cdn.example/a/b/photo.png".into(),
            filename: Some("cat.png".into()),
            mime_type: Some("image/png".into()),
            size_bytes: Some(1024),
        };
        assert_eq!(named.display_name(), "cat.png");

        let unnamed = Attachment {
            filename: None,
            ..named
        };
        assert_eq!(unnamed.display_name(), "photo.png");
    }

    #[test]
    fn origin_message_serialization_skips_empty() {
        let msg = OriginMessage {
            id: "1".into(),
            channel_id: "2".into(),
            guild_id: None,
            author_id: "3".into(),
            author_name: "bob".into(),
            content: "hello".into(),
            attachments: vec![],
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("guild_id"));
        assert!(!json.contains("attachments"));
    }
}
