//! Operation executor: runs one approved call against the registry.
//!
//! Normalizes arguments against the origin message, resolves the handler,
//! holds the operation context for the duration of the call, converts
//! failures into `{error}` results the model can read, and paces calls
//! against the chat platform's rate limits.

use guildpilot_core::event::{DomainEvent, EventBus};
use guildpilot_core::operation::{ContextSlot, OperationCall, OperationContext, OperationRegistry};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::checklist::truncate_chars;
use crate::execution_log::EntryStatus;
use crate::settings::OrchestratorSettings;

/// Sentinel a channel-replacing operation embeds in its result.
pub const REPLACEMENT_CHANNEL_OPEN: &str = "[[replacement-channel:";
const REPLACEMENT_CHANNEL_CLOSE: &str = "]]";

const CHANNEL_KEYS: &[&str] = &["channel", "channelId", "channel_id"];
const CHANNEL_ALIASES: &[&str] = &["", "this channel", "current channel", "here"];
const PREVIEW_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub pacing: Duration,

    /// Operations whose `channel` defaults to the origin channel when absent
    pub channel_defaulted: HashSet<String>,

    /// Operation whose result may announce a replacement channel
    pub channel_replace: Option<String>,
}

impl From<&OrchestratorSettings> for ExecutorSettings {
    fn from(settings: &OrchestratorSettings) -> Self {
        Self {
            pacing: settings.pacing,
            channel_defaulted: settings.channel_defaulted.iter().cloned().collect(),
            channel_replace: settings.channel_replace.clone(),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorSettings::default())
    }
}

/// What happened when a call ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub result: Value,
    pub status: EntryStatus,

    /// False when no handler was registered under the call's name
    pub resolved: bool,

    /// Channel that replaced the origin channel, if the call created one
    pub replacement_channel: Option<String>,
}

pub struct OperationExecutor {
    registry: Arc<OperationRegistry>,
    slot: ContextSlot,
    settings: ExecutorSettings,
    events: Arc<EventBus>,
    run_id: String,
}

impl OperationExecutor {
    pub fn new(
        registry: Arc<OperationRegistry>,
        settings: ExecutorSettings,
        events: Arc<EventBus>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            slot: ContextSlot::new(),
            settings,
            events,
            run_id: run_id.into(),
        }
    }

    /// Share a context slot with an outside observer (e.g. a confirmation layer).
    pub fn with_context_slot(mut self, slot: ContextSlot) -> Self {
        self.slot = slot;
        self
    }

    pub fn context_slot(&self) -> &ContextSlot {
        &self.slot
    }

    /// Run `call` on behalf of the origin message in `context`.
    pub async fn execute(&self, call: &OperationCall, context: &OperationContext) -> ExecutionOutcome {
        let start = Instant::now();
        let outcome = self.dispatch(call, context).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let preview = truncate_chars(&result_text(&outcome.result), PREVIEW_LIMIT);
        if outcome.status == EntryStatus::Error {
            warn!(
                run_id = %self.run_id,
                operation = %call.name,
                duration_ms,
                result = %preview,
                "Operation failed"
            );
        } else {
            info!(
                run_id = %self.run_id,
                operation = %call.name,
                duration_ms,
                result = %preview,
                "Operation executed"
            );
        }

        self.events.publish(DomainEvent::OperationExecuted {
            run_id: self.run_id.clone(),
            operation: call.name.clone(),
            success: outcome.status == EntryStatus::Success,
            duration_ms,
            timestamp: chrono::Utc::now(),
        });

        if !self.settings.pacing.is_zero() {
            tokio::time::sleep(self.settings.pacing).await;
        }

        outcome
    }

    async fn dispatch(&self, call: &OperationCall, context: &OperationContext) -> ExecutionOutcome {
        let Some(operation) = self.registry.get(&call.name) else {
            let message = match self.registry.suggest(&call.name) {
                Some(known) => format!("Unknown operation '{}'. Did you mean '{known}'?", call.name),
                None => format!("Unknown operation '{}'.", call.name),
            };
            return ExecutionOutcome {
                result: json!({ "error": message }),
                status: EntryStatus::Error,
                resolved: false,
                replacement_channel: None,
            };
        };

        let args = normalize_arguments(
            &call.name,
            call.args.clone(),
            context,
            &self.settings.channel_defaulted,
        );

        let result = {
            let _guard = self.slot.install(context.clone());
            operation.execute(args, context).await
        };

        let mut result = match result {
            Ok(value) => value,
            Err(e) => json!({ "error": e.to_string() }),
        };

        let mut replacement_channel = None;
        if self.settings.channel_replace.as_deref() == Some(call.name.as_str()) {
            let (stripped, channel) = extract_replacement_channel(result);
            result = stripped;
            replacement_channel = channel;
        }

        let status = if is_error_result(&result) {
            EntryStatus::Error
        } else {
            EntryStatus::Success
        };

        ExecutionOutcome {
            result,
            status,
            resolved: true,
            replacement_channel,
        }
    }
}

/// Fill in arguments the model tends to leave out or phrase loosely.
///
/// A missing `server` defaults to the origin guild; channel aliases such as
/// "this channel" resolve to the origin channel; operations in
/// `channel_defaulted` get a `channel` even when none was given.
pub fn normalize_arguments(
    name: &str,
    args: Option<Value>,
    context: &OperationContext,
    channel_defaulted: &HashSet<String>,
) -> Value {
    let mut map = match args {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => return other,
    };

    if let Some(guild_id) = &context.guild_id {
        if map.get("server").is_none_or(Value::is_null) {
            map.insert("server".into(), Value::String(guild_id.clone()));
        }
    }

    for key in CHANNEL_KEYS {
        let aliased = matches!(map.get(*key), Some(Value::String(v)) if is_channel_alias(v));
        if aliased {
            map.insert((*key).into(), Value::String(context.channel_id.clone()));
        }
    }

    if channel_defaulted.contains(name) && !CHANNEL_KEYS.iter().any(|k| map.contains_key(*k)) {
        map.insert("channel".into(), Value::String(context.channel_id.clone()));
    }

    Value::Object(map)
}

fn is_channel_alias(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    CHANNEL_ALIASES.contains(&value.as_str())
}

/// Whether a handler result reports a soft failure.
pub fn is_error_result(result: &Value) -> bool {
    result
        .as_object()
        .and_then(|map| map.get("error"))
        .is_some_and(|e| !e.is_null())
}

/// Strip the replacement-channel sentinel from a result, returning the
/// cleaned result and the channel id it carried.
pub fn extract_replacement_channel(result: Value) -> (Value, Option<String>) {
    match result {
        Value::String(text) => {
            let (clean, channel) = strip_sentinel(&text);
            (Value::String(clean), channel)
        }
        Value::Object(mut map) => {
            let mut found = None;
            for value in map.values_mut() {
                if let Value::String(text) = value {
                    let (clean, channel) = strip_sentinel(text);
                    if channel.is_some() {
                        *text = clean;
                        found = found.or(channel);
                    }
                }
            }
            (Value::Object(map), found)
        }
        other => (other, None),
    }
}

fn strip_sentinel(text: &str) -> (String, Option<String>) {
    let Some(start) = text.find(REPLACEMENT_CHANNEL_OPEN) else {
        return (text.to_string(), None);
    };
    let id_start = start + REPLACEMENT_CHANNEL_OPEN.len();
    let Some(len) = text[id_start..].find(REPLACEMENT_CHANNEL_CLOSE) else {
        return (text.to_string(), None);
    };
    let id = text[id_start..id_start + len].trim().to_string();
    let end = id_start + len + REPLACEMENT_CHANNEL_CLOSE.len();
    let clean = format!("{}{}", &text[..start], &text[end..]).trim().to_string();
    if id.is_empty() {
        (clean, None)
    } else {
        (clean, Some(id))
    }
}

/// Result as plain text: strings verbatim, everything else as JSON.
pub fn result_text(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use guildpilot_core::error::OperationError;
    use guildpilot_core::operation::Operation;
    use guildpilot_core::platform::OriginMessage;
    use std::sync::Mutex;

    /// Records the arguments it was called with and whether the context slot
    /// was occupied at the time.
    struct RecordingOperation {
        name: &'static str,
        reply: Value,
        seen: Arc<Mutex<Vec<Value>>>,
        slot: ContextSlot,
        slot_seen: Arc<Mutex<Vec<bool>>>,
    }

    #[async_trait]
    impl Operation for RecordingOperation {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "records calls"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(
            &self,
            arguments: Value,
            _context: &OperationContext,
        ) -> Result<Value, OperationError> {
            self.seen.lock().unwrap().push(arguments);
            self.slot_seen.lock().unwrap().push(self.slot.is_occupied());
            Ok(self.reply.clone())
        }
    }

    struct FailingOperation;

    #[async_trait]
    impl Operation for FailingOperation {
        fn name(&self) -> &str {
            "banUser"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(
            &self,
            _arguments: Value,
            _context: &OperationContext,
        ) -> Result<Value, OperationError> {
            Err(OperationError::PermissionDenied {
                operation: "banUser".into(),
                reason: "missing Ban Members".into(),
            })
        }
    }

    fn context() -> OperationContext {
        OperationContext::from_origin(&OriginMessage {
            id: "m1".into(),
            channel_id: "chan-1".into(),
            guild_id: Some("guild-1".into()),
            author_id: "user-1".into(),
            author_name: "alice".into(),
            content: "do it".into(),
            attachments: vec![],
            timestamp: Utc::now(),
        })
    }

    struct Harness {
        executor: OperationExecutor,
        seen: Arc<Mutex<Vec<Value>>>,
        slot_seen: Arc<Mutex<Vec<bool>>>,
    }

    fn harness(name: &'static str, reply: Value, pacing: Duration) -> Harness {
        let slot = ContextSlot::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let slot_seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = OperationRegistry::new();
        registry.register(Box::new(RecordingOperation {
            name,
            reply,
            seen: seen.clone(),
            slot: slot.clone(),
            slot_seen: slot_seen.clone(),
        }));
        registry.register(Box::new(FailingOperation));
        let settings = ExecutorSettings {
            pacing,
            ..ExecutorSettings::default()
        };
        let executor =
            OperationExecutor::new(Arc::new(registry), settings, Arc::new(EventBus::default()), "run-1")
                .with_context_slot(slot);
        Harness {
            executor,
            seen,
            slot_seen,
        }
    }

    #[test]
    fn server_defaults_to_origin_guild() {
        let args = normalize_arguments("createRole", Some(json!({"name": "Mods"})), &context(), &HashSet::new());
        assert_eq!(args, json!({"name": "Mods", "server": "guild-1"}));

        let explicit = normalize_arguments(
            "createRole",
            Some(json!({"name": "Mods", "server": "other"})),
            &context(),
            &HashSet::new(),
        );
        assert_eq!(explicit["server"], "other");
    }

    #[test]
    fn channel_aliases_resolve_to_origin_channel() {
        for alias in ["", "this channel", "Current Channel", " here "] {
            let args = normalize_arguments(
                "sendMessage",
                Some(json!({"channelId": alias, "text": "hi"})),
                &context(),
                &HashSet::new(),
            );
            assert_eq!(args["channelId"], "chan-1", "alias {alias:?}");
        }
        let named = normalize_arguments(
            "sendMessage",
            Some(json!({"channel": "general"})),
            &context(),
            &HashSet::new(),
        );
        assert_eq!(named["channel"], "general");
    }

    #[test]
    fn bulk_operations_get_channel_when_absent() {
        let defaulted: HashSet<String> = ["purgeMessages".to_string()].into();
        let args = normalize_arguments("purgeMessages", None, &context(), &defaulted);
        assert_eq!(args["channel"], "chan-1");

        let other = normalize_arguments("createRole", None, &context(), &defaulted);
        assert!(other.get("channel").is_none());
    }

    #[test]
    fn sentinel_is_stripped_from_strings_and_objects() {
        let (clean, channel) =
            extract_replacement_channel(json!("Channel purged. [[replacement-channel:987]]"));
        assert_eq!(clean, json!("Channel purged."));
        assert_eq!(channel.as_deref(), Some("987"));

        let (clean, channel) = extract_replacement_channel(
            json!({"message": "[[replacement-channel:42]] Recreated", "ok": true}),
        );
        assert_eq!(clean["message"], "Recreated");
        assert_eq!(channel.as_deref(), Some("42"));

        let (clean, channel) = extract_replacement_channel(json!("nothing here"));
        assert_eq!(clean, json!("nothing here"));
        assert!(channel.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn executes_with_context_installed_and_paces() {
        let h = harness("createRole", json!("Created role Mods"), Duration::from_millis(500));
        let start = tokio::time::Instant::now();

        let outcome = h
            .executor
            .execute(&OperationCall::new("createRole", json!({"name": "Mods"})), &context())
            .await;

        assert_eq!(outcome.status, EntryStatus::Success);
        assert_eq!(outcome.result, json!("Created role Mods"));
        assert!(outcome.resolved);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(h.slot_seen.lock().unwrap().as_slice(), &[true]);
        assert!(!h.executor.context_slot().is_occupied());
        assert_eq!(h.seen.lock().unwrap()[0]["server"], "guild-1");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_operation_suggests_near_match() {
        let h = harness("createRole", json!("ok"), Duration::from_millis(500));
        let start = tokio::time::Instant::now();

        let outcome = h
            .executor
            .execute(&OperationCall::new("create_role", json!({})), &context())
            .await;

        assert_eq!(outcome.status, EntryStatus::Error);
        assert!(!outcome.resolved);
        let message = outcome.result["error"].as_str().unwrap();
        assert!(message.contains("Did you mean 'createRole'"), "{message}");
        // Unknown names are paced like any other call.
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert!(h.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn handler_errors_become_error_results() {
        let h = harness("createRole", json!("ok"), Duration::ZERO);
        let outcome = h.executor.execute(&OperationCall::bare("banUser"), &context()).await;
        assert_eq!(outcome.status, EntryStatus::Error);
        assert!(outcome.resolved);
        assert!(outcome.result["error"].as_str().unwrap().contains("Ban Members"));
        assert!(!h.executor.context_slot().is_occupied());
    }

    #[tokio::test]
    async fn soft_error_objects_are_errors() {
        let h = harness("createRole", json!({"error": "Role exists"}), Duration::ZERO);
        let outcome = h
            .executor
            .execute(&OperationCall::new("createRole", json!({"name": "Mods"})), &context())
            .await;
        assert_eq!(outcome.status, EntryStatus::Error);
    }

    #[tokio::test]
    async fn channel_replace_records_new_channel() {
        let h = harness(
            "purgeChannel",
            json!("Purged #general [[replacement-channel:555]]"),
            Duration::ZERO,
        );
        let outcome = h.executor.execute(&OperationCall::bare("purgeChannel"), &context()).await;
        assert_eq!(outcome.replacement_channel.as_deref(), Some("555"));
        assert_eq!(outcome.result, json!("Purged #general"));
    }

    #[tokio::test]
    async fn publishes_execution_event() {
        let h = harness("createRole", json!("ok"), Duration::ZERO);
        let mut rx = h.executor.events.subscribe();
        h.executor
            .execute(&OperationCall::new("createRole", json!({"name": "x"})), &context())
            .await;
        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::OperationExecuted {
                run_id,
                operation,
                success,
                ..
            } => {
                assert_eq!(run_id, "run-1");
                assert_eq!(operation, "createRole");
                assert!(success);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
