//! Provider trait — the abstraction over generative model backends.
//!
//! A Provider takes a conversation plus the available operations and returns
//! zero or more proposed operation calls and/or generated text. The wire
//! protocol lives in the implementation; the orchestrator only sees this
//! trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::ConversationEntry;
use crate::operation::OperationCall;

/// How the provider should shape its text output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Ask for a bare JSON document (used by the planner)
    Json,
}

/// A provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The model to use
    pub model: String,

    /// System instruction sent alongside the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// The conversation turns
    pub contents: Vec<ConversationEntry>,

    /// Operations the model may propose
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationDefinition>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default)]
    pub response_format: ResponseFormat,
}

fn default_temperature() -> f32 {
    0.7
}

impl GenerateRequest {
    /// A tool-less, single-prompt request used for lightweight auxiliary calls.
    pub fn prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            contents: vec![ConversationEntry::user(prompt)],
            operations: Vec::new(),
            temperature: default_temperature(),
            response_format: ResponseFormat::Text,
        }
    }
}

/// An operation definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub name: String,

    /// Description of what the operation does
    pub description: String,

    /// JSON Schema describing the operation's parameters
    pub parameters: serde_json::Value,
}

/// A complete provider response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Proposed operation calls, in emitted order
    #[serde(default)]
    pub calls: Vec<OperationCall>,

    /// Generated text parts, joined
    #[serde(default)]
    pub text: String,

    /// Which model actually responded
    #[serde(default)]
    pub model: String,
}

impl GenerateResponse {
    /// A response carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            calls: Vec::new(),
            text: text.into(),
            model: String::new(),
        }
    }

    /// A response proposing calls, with no text.
    pub fn calls(calls: Vec<OperationCall>) -> Self {
        Self {
            calls,
            text: String::new(),
            model: String::new(),
        }
    }

    pub fn has_calls(&self) -> bool {
        !self.calls.is_empty()
    }
}

/// The core Provider trait.
///
/// Every generative backend implements this trait. Decorators (retry,
/// replay) wrap another `Provider` and implement it again.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError>;
}
