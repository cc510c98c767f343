//! Operation trait — the abstraction over side-effecting handlers.
//!
//! Operations are what give the assistant the ability to act on the chat
//! platform: create roles, send messages, purge channels, search, and so on.
//! The concrete handlers live outside this workspace; the orchestrator only
//! sees the trait and the registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::OperationError;
use crate::platform::OriginMessage;
use crate::provider::OperationDefinition;

/// A provider-proposed request to run an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCall {
    /// Name of the operation to invoke
    pub name: String,

    /// Argument bag; `None` when the provider sent no arguments at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
}

impl OperationCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            args: Some(args),
        }
    }

    /// A call with no argument bag.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: None,
        }
    }
}

/// Who asked for an operation and where.
///
/// Handed to every handler invocation so permission and confirmation checks
/// can see the originating message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// The chat message that started this run
    pub origin: OriginMessage,

    /// The acting user (author of the origin message)
    pub user_id: String,

    /// The channel the request came from
    pub channel_id: String,

    /// The server the request came from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
}

impl OperationContext {
    pub fn from_origin(origin: &OriginMessage) -> Self {
        Self {
            user_id: origin.author_id.clone(),
            channel_id: origin.channel_id.clone(),
            guild_id: origin.guild_id.clone(),
            origin: origin.clone(),
        }
    }
}

/// A single-occupancy slot holding the context of the operation currently
/// executing.
///
/// Cloning shares the slot. Installing returns a guard; dropping the guard
/// clears the slot on every exit path, including unwinding.
#[derive(Debug, Clone, Default)]
pub struct ContextSlot {
    inner: Arc<Mutex<Option<OperationContext>>>,
}

impl ContextSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupy the slot until the returned guard is dropped.
    pub fn install(&self, context: OperationContext) -> ContextGuard {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            tracing::warn!("operation context slot already occupied, replacing");
        }
        *slot = Some(context);
        ContextGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// The context of the operation currently executing, if any.
    pub fn current(&self) -> Option<OperationContext> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_occupied(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// Releases a [`ContextSlot`] when dropped.
#[must_use = "the context is cleared as soon as the guard is dropped"]
pub struct ContextGuard {
    inner: Arc<Mutex<Option<OperationContext>>>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// The core Operation trait.
///
/// A handler returns either a plain string or a JSON object. Returning an
/// object with an `error` field reports a soft failure without raising.
#[async_trait]
pub trait Operation: Send + Sync {
    /// The unique name of this operation (e.g., "createRole").
    fn name(&self) -> &str;

    /// A description of what this operation does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this operation's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the operation.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &OperationContext,
    ) -> std::result::Result<serde_json::Value, OperationError>;

    /// Convert this operation into a definition for sending to the model.
    fn to_definition(&self) -> OperationDefinition {
        OperationDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available operations, fixed at startup and shared
/// read-only between runs.
pub struct OperationRegistry {
    operations: HashMap<String, Box<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Register an operation. Replaces any existing one with the same name.
    pub fn register(&mut self, operation: Box<dyn Operation>) {
        let name = operation.name().to_string();
        self.operations.insert(name, operation);
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<&dyn Operation> {
        self.operations.get(name).map(|o| o.as_ref())
    }

    /// Find a registered name that matches `name` once both are lowercased
    /// and stripped of underscores (`create_role` → `createRole`).
    pub fn suggest(&self, name: &str) -> Option<&str> {
        let wanted = normalize_name(name);
        if wanted.is_empty() {
            return None;
        }
        let mut names = self.names();
        names.sort_unstable();
        names.into_iter().find(|known| normalize_name(known) == wanted)
    }

    /// All definitions, sorted by name for stable prompts.
    pub fn definitions(&self) -> Vec<OperationDefinition> {
        let mut defs: Vec<_> = self.operations.values().map(|o| o.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered operation names.
    pub fn names(&self) -> Vec<&str> {
        self.operations.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct EchoOperation;

    #[async_trait]
    impl Operation for EchoOperation {
        fn name(&self) -> &str {
            "echoText"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _context: &OperationContext,
        ) -> std::result::Result<serde_json::Value, OperationError> {
            Ok(arguments["text"].clone())
        }
    }

    fn origin() -> OriginMessage {
        OriginMessage {
            id: "m1".into(),
            channel_id: "c1".into(),
            guild_id: Some("g1".into()),
            author_id: "u1".into(),
            author_name: "alice".into(),
            content: "hi".into(),
            attachments: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = OperationRegistry::new();
        registry.register(Box::new(EchoOperation));
        assert!(registry.get("echoText").is_some());
        assert!(registry.get("echotext").is_none());
        assert_eq!(registry.definitions()[0].name, "echoText");
    }

    #[test]
    fn suggest_ignores_case_and_underscores() {
        let mut registry = OperationRegistry::new();
        registry.register(Box::new(EchoOperation));
        assert_eq!(registry.suggest("echo_text"), Some("echoText"));
        assert_eq!(registry.suggest("ECHOTEXT"), Some("echoText"));
        assert_eq!(registry.suggest("shout"), None);
        assert_eq!(registry.suggest("__"), None);
    }

    #[tokio::test]
    async fn execute_receives_context() {
        let op = EchoOperation;
        let ctx = OperationContext::from_origin(&origin());
        assert_eq!(ctx.user_id, "u1");
        assert_eq!(ctx.guild_id.as_deref(), Some("g1"));
        let out = op
            .execute(serde_json::json!({"text": "hello"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!("hello"));
    }

    #[test]
    fn context_slot_cleared_when_guard_drops() {
        let slot = ContextSlot::new();
        {
            let _guard = slot.install(OperationContext::from_origin(&origin()));
            assert!(slot.is_occupied());
            assert_eq!(slot.current().unwrap().channel_id, "c1");
        }
        assert!(!slot.is_occupied());
    }

    #[test]
    fn context_slot_cleared_on_panic() {
        let slot = ContextSlot::new();
        let shared = slot.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = shared.install(OperationContext::from_origin(&origin()));
            panic!("handler blew up");
        });
        assert!(result.is_err());
        assert!(!slot.is_occupied());
    }

    #[test]
    fn bare_call_has_no_args() {
        let call = OperationCall::bare("listRoles");
        assert!(call.args.is_none());
        let json = serde_json::to_string(&call).unwrap();
        assert_eq!(json, r#"{"name":"listRoles"}"#);
    }
}
