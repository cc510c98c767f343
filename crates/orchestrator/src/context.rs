//! Conversation assembly from channel history and the current request.

use base64::Engine;
use guildpilot_config::ContextConfig;
use guildpilot_core::message::{Conversation, ConversationEntry, Part, Role};
use guildpilot_core::platform::{Attachment, ChatSurface, OriginMessage};
use tracing::{debug, warn};

const FALLBACK_MIME: &str = "application/octet-stream";

/// Builds the provider conversation and system instruction for one request.
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Recent history followed by the current request.
    ///
    /// The result alternates roles and always opens with a user turn. History
    /// that cannot be fetched is skipped.
    pub async fn build(&self, surface: &dyn ChatSurface) -> Conversation {
        let mut conversation = Conversation::new();

        let history = if self.config.history_limit == 0 {
            Vec::new()
        } else {
            match surface.recent_history(self.config.history_limit).await {
                Ok(history) => history,
                Err(e) => {
                    warn!(error = %e, "Channel history unavailable, continuing without it");
                    Vec::new()
                }
            }
        };

        for message in &history {
            let role = if message.from_assistant {
                Role::Model
            } else {
                Role::User
            };
            let mut parts = Vec::new();
            if !message.content.trim().is_empty() {
                parts.push(Part::Text(match role {
                    Role::User => format!("{}: {}", message.author_name, message.content),
                    Role::Model => message.content.clone(),
                }));
            }
            for attachment in &message.attachments {
                parts.push(self.attachment_part(surface, attachment).await);
            }
            if parts.is_empty() {
                continue;
            }
            conversation.push(ConversationEntry {
                role,
                parts,
                timestamp: message.timestamp,
            });
        }

        let origin = surface.origin();
        let mut parts = vec![Part::Text(format!("{}: {}", origin.author_name, origin.content))];
        for attachment in &origin.attachments {
            parts.push(self.attachment_part(surface, attachment).await);
        }
        conversation.push(ConversationEntry {
            role: Role::User,
            parts,
            timestamp: origin.timestamp,
        });

        let leading_model = conversation
            .entries
            .iter()
            .take_while(|e| e.role == Role::Model)
            .count();
        conversation.entries.drain(..leading_model);

        debug!(
            turns = conversation.len(),
            history = history.len(),
            "Conversation assembled"
        );
        conversation
    }

    /// Configured prompt plus where the request came from.
    pub fn system_instruction(&self, origin: &OriginMessage) -> String {
        let server = match &origin.guild_id {
            Some(id) => format!("Server ID: {id}"),
            None => "Server: none (direct message)".to_string(),
        };
        format!(
            "{}\n\n{server}\nChannel ID: {}\nRequested by: {} (ID {})\nCurrent time: {}",
            self.config.system_prompt,
            origin.channel_id,
            origin.author_name,
            origin.author_id,
            origin.timestamp.to_rfc3339(),
        )
    }

    /// Inline small supported attachments; reference everything else.
    async fn attachment_part(&self, surface: &dyn ChatSurface, attachment: &Attachment) -> Part {
        let mime_type = attachment
            .mime_type
            .clone()
            .unwrap_or_else(|| FALLBACK_MIME.to_string());
        let fits = attachment
            .size_bytes
            .is_none_or(|size| size <= self.config.inline_attachment_limit);

        if !fits || !self.inlinable(&mime_type) {
            return Part::FileReference {
                mime_type,
                uri: attachment.url.clone(),
            };
        }

        match surface.fetch_attachment(attachment).await {
            Ok(bytes) if bytes.len() as u64 <= self.config.inline_attachment_limit => Part::InlineData {
                mime_type,
                data: base64::engine::general_purpose::STANDARD.encode(&bytes),
            },
            Ok(_) => Part::FileReference {
                mime_type,
                uri: attachment.url.clone(),
            },
            Err(e) => {
                warn!(attachment = %attachment.display_name(), error = %e, "Failed to fetch attachment");
                Part::Text(format!(
                    "[Attachment '{}' could not be loaded]",
                    attachment.display_name()
                ))
            }
        }
    }

    fn inlinable(&self, mime_type: &str) -> bool {
        let mime_type = mime_type.to_lowercase();
        self.config.inline_mime_types.iter().any(|pattern| {
            match pattern.strip_suffix("/*") {
                Some(prefix) => mime_type
                    .split_once('/')
                    .is_some_and(|(kind, _)| kind == prefix),
                None => *pattern == mime_type,
            }
        })
    }
}
