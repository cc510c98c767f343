//! Console surface. Prints what the orchestrator would post to chat.
//!
//! Used by `guildpilot replay`: replies, checklist edits and redirected
//! messages go to stdout with a short prefix so the run reads like a chat log.

use async_trait::async_trait;
use guildpilot_core::error::PlatformError;
use guildpilot_core::platform::{ChatSurface, HistoryMessage, OriginMessage, PostedMessage};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// A terminal stand-in for a chat channel.
pub struct ConsoleSurface {
    origin: OriginMessage,
    history: Vec<HistoryMessage>,
    next_id: AtomicU64,
    transcript: Mutex<Vec<String>>,
    quiet: bool,
}

impl ConsoleSurface {
    pub fn new(origin: OriginMessage) -> Self {
        Self {
            origin,
            history: Vec::new(),
            next_id: AtomicU64::new(1),
            transcript: Mutex::new(Vec::new()),
            quiet: false,
        }
    }

    /// Serve `history` as the channel's recent messages.
    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    /// Record without printing.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Every line written so far.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn post(&self, channel_id: &str, label: &str, content: &str) -> PostedMessage {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        self.write(format!("[{label} #{channel_id}/{message_id}]\n{content}"));
        PostedMessage {
            channel_id: channel_id.to_string(),
            message_id,
        }
    }

    fn write(&self, line: String) {
        if !self.quiet {
            println!("{line}\n");
        }
        self.transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line);
    }
}

#[async_trait]
impl ChatSurface for ConsoleSurface {
    fn origin(&self) -> &OriginMessage {
        &self.origin
    }

    async fn reply(&self, content: &str) -> Result<PostedMessage, PlatformError> {
        Ok(self.post(&self.origin.channel_id, "reply", content))
    }

    async fn edit(&self, message: &PostedMessage, content: &str) -> Result<(), PlatformError> {
        self.write(format!(
            "[edit #{}/{}]\n{content}",
            message.channel_id, message.message_id
        ));
        Ok(())
    }

    async fn send_to_channel(
        &self,
        channel_id: &str,
        content: &str,
    ) -> Result<PostedMessage, PlatformError> {
        Ok(self.post(channel_id, "send", content))
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryMessage>, PlatformError> {
        let skip = self.history.len().saturating_sub(limit);
        Ok(self.history[skip..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn origin() -> OriginMessage {
        OriginMessage {
            id: "0".into(),
            channel_id: "console".into(),
            guild_id: None,
            author_id: "operator".into(),
            author_name: "operator".into(),
            content: "hello".into(),
            attachments: vec![],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn posts_get_increasing_ids() {
        let surface = ConsoleSurface::new(origin()).quiet();
        let first = surface.reply("one").await.unwrap();
        let second = surface.send_to_channel("other", "two").await.unwrap();
        assert_eq!(first.message_id, "1");
        assert_eq!(first.channel_id, "console");
        assert_eq!(second.message_id, "2");
        assert_eq!(second.channel_id, "other");

        surface.edit(&first, "one, edited").await.unwrap();
        let transcript = surface.transcript();
        assert_eq!(transcript.len(), 3);
        assert!(transcript[2].starts_with("[edit #console/1]"));
    }

    #[tokio::test]
    async fn history_is_capped_to_most_recent() {
        let message = |content: &str| HistoryMessage {
            author_id: "u".into(),
            author_name: "u".into(),
            from_assistant: false,
            content: content.into(),
            attachments: vec![],
            timestamp: Utc::now(),
        };
        let surface = ConsoleSurface::new(origin())
            .with_history(vec![message("a"), message("b"), message("c")])
            .quiet();
        let recent = surface.recent_history(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "b");
    }
}
