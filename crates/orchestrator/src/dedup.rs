//! Call deduplication.
//!
//! Providers only see earlier results as conversation text, so they often
//! re-propose a call that already ran. The deduplicator short-circuits those
//! calls and hands back the known result so the model can finish its answer
//! without repeating side effects.

use guildpilot_core::operation::OperationCall;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::signature::{Signature, sign};

/// Why a call was not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A rate-limited operation was attempted more than once
    RepeatGuard,
    /// A single-execution operation already ran, with any arguments
    SingleExecution,
    /// The exact same call already ran
    Duplicate,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RepeatGuard => "repeat_guard",
            Self::SingleExecution => "single_execution",
            Self::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Execute,
    Skip { reason: SkipReason, result: Value },
}

/// Per-run caches. Never shared between runs.
#[derive(Debug, Default)]
pub struct DedupCaches {
    by_signature: HashMap<Signature, Value>,
    by_name: HashMap<String, Value>,
    repeat_attempts: HashMap<String, u32>,
    skips: u32,
}

impl DedupCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips so far this run; drives the loop guard.
    pub fn skip_count(&self) -> u32 {
        self.skips
    }
}

/// Decides whether a proposed call runs.
#[derive(Debug, Clone, Default)]
pub struct CallDeduplicator {
    single_execution: HashSet<String>,
    repeat_guard: Option<String>,
}

impl CallDeduplicator {
    pub fn new(
        single_execution: impl IntoIterator<Item = String>,
        repeat_guard: Option<String>,
    ) -> Self {
        Self {
            single_execution: single_execution.into_iter().collect(),
            repeat_guard: repeat_guard.filter(|name| !name.is_empty()),
        }
    }

    pub fn is_single_execution(&self, name: &str) -> bool {
        self.single_execution.contains(name)
    }

    /// Gate a call. The name-based cache is consulted before the signature
    /// cache, so a single-execution name with new arguments is still skipped.
    pub fn check(&self, call: &OperationCall, caches: &mut DedupCaches) -> Decision {
        let decision = self.decide(call, caches);
        if matches!(decision, Decision::Skip { .. }) {
            caches.skips += 1;
        }
        decision
    }

    fn decide(&self, call: &OperationCall, caches: &mut DedupCaches) -> Decision {
        if self.repeat_guard.as_deref() == Some(call.name.as_str()) {
            let attempts = caches.repeat_attempts.entry(call.name.clone()).or_insert(0);
            *attempts += 1;
            if *attempts > 1 {
                return Decision::Skip {
                    reason: SkipReason::RepeatGuard,
                    result: repeat_guard_notice(&call.name),
                };
            }
        }

        if self.is_single_execution(&call.name) {
            if let Some(previous) = caches.by_name.get(&call.name) {
                return Decision::Skip {
                    reason: SkipReason::SingleExecution,
                    result: duplicate_notice(&call.name, previous),
                };
            }
        }

        let signature = sign(&call.name, call.args.as_ref());
        if let Some(previous) = caches.by_signature.get(&signature) {
            return Decision::Skip {
                reason: SkipReason::Duplicate,
                result: duplicate_notice(&call.name, previous),
            };
        }

        Decision::Execute
    }

    /// Remember the result of a call that actually ran. First write wins.
    pub fn record(&self, call: &OperationCall, result: &Value, caches: &mut DedupCaches) {
        caches
            .by_signature
            .entry(sign(&call.name, call.args.as_ref()))
            .or_insert_with(|| result.clone());
        if self.is_single_execution(&call.name) {
            caches
                .by_name
                .entry(call.name.clone())
                .or_insert_with(|| result.clone());
        }
    }
}

/// Notice returned in place of re-running an operation that already ran.
pub fn duplicate_notice(name: &str, previous: &Value) -> Value {
    let previous = match previous {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Value::String(format!(
        "Duplicate call: {name} already ran for this request. Stop calling it and use the \
         previous result: {previous}"
    ))
}

/// Notice returned when the repeat-guarded operation is attempted again.
pub fn repeat_guard_notice(name: &str) -> Value {
    Value::String(format!(
        "{name} may only be used once per request. Do not call it again; work with the \
         result you already have."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dedup() -> CallDeduplicator {
        CallDeduplicator::new(
            vec!["search".to_string()],
            Some("screenshotWebsite".to_string()),
        )
    }

    #[test]
    fn first_call_executes() {
        let d = dedup();
        let mut caches = DedupCaches::new();
        let call = OperationCall::new("createRole", json!({"name": "Mods"}));
        assert_eq!(d.check(&call, &mut caches), Decision::Execute);
        assert_eq!(caches.skip_count(), 0);
    }

    #[test]
    fn identical_signature_is_skipped_with_previous_result() {
        let d = dedup();
        let mut caches = DedupCaches::new();
        let first = OperationCall::new("createRole", json!({"name": "Mods", "color": 1}));
        let second = OperationCall::new("createRole", json!({"color": 1, "name": "Mods"}));

        assert_eq!(d.check(&first, &mut caches), Decision::Execute);
        d.record(&first, &json!("Created role Mods"), &mut caches);

        let decision = d.check(&second, &mut caches);
        assert_eq!(
            decision,
            Decision::Skip {
                reason: SkipReason::Duplicate,
                result: duplicate_notice("createRole", &json!("Created role Mods")),
            }
        );
        assert_eq!(caches.skip_count(), 1);
    }

    #[test]
    fn single_execution_ignores_arguments() {
        let d = dedup();
        let mut caches = DedupCaches::new();
        let first = OperationCall::new("search", json!({"query": "rust"}));
        let second = OperationCall::new("search", json!({"query": "tokio"}));

        assert_eq!(d.check(&first, &mut caches), Decision::Execute);
        d.record(&first, &json!({"results": []}), &mut caches);

        match d.check(&second, &mut caches) {
            Decision::Skip { reason, result } => {
                assert_eq!(reason, SkipReason::SingleExecution);
                assert_eq!(result, duplicate_notice("search", &json!({"results": []})));
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn different_arguments_outside_single_set_execute() {
        let d = dedup();
        let mut caches = DedupCaches::new();
        let first = OperationCall::new("createRole", json!({"name": "Mods"}));
        d.record(&first, &json!("ok"), &mut caches);
        let second = OperationCall::new("createRole", json!({"name": "Admins"}));
        assert_eq!(d.check(&second, &mut caches), Decision::Execute);
    }

    #[test]
    fn repeat_guard_allows_only_first_attempt() {
        let d = dedup();
        let mut caches = DedupCaches::new();
        let a = OperationCall::new("screenshotWebsite", json!({"url": "https://a.example"}));
        let b = OperationCall::new("screenshotWebsite", json!({"url": "https://b.example"}));

        assert_eq!(d.check(&a, &mut caches), Decision::Execute);
        // Counted even though nothing was recorded for the first attempt.
        assert_eq!(
            d.check(&b, &mut caches),
            Decision::Skip {
                reason: SkipReason::RepeatGuard,
                result: repeat_guard_notice("screenshotWebsite"),
            }
        );
        assert_eq!(caches.skip_count(), 1);
    }

    #[test]
    fn record_is_write_once() {
        let d = dedup();
        let mut caches = DedupCaches::new();
        let call = OperationCall::new("search", json!({"query": "x"}));
        d.record(&call, &json!("first"), &mut caches);
        d.record(&call, &json!("second"), &mut caches);
        match d.check(&call, &mut caches) {
            Decision::Skip { result, .. } => {
                assert_eq!(result, duplicate_notice("search", &json!("first")))
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn empty_repeat_guard_name_is_ignored() {
        let d = CallDeduplicator::new(Vec::new(), Some(String::new()));
        let mut caches = DedupCaches::new();
        let call = OperationCall::bare("");
        assert_eq!(d.check(&call, &mut caches), Decision::Execute);
    }
}
