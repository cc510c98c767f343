//! Planner pre-pass. Seeds the checklist before real arguments are known.
//!
//! One light-model call asks which operations the request will need. The
//! answer only shapes the initial checklist; the main loop decides what
//! actually runs. Every failure here is swallowed.

use guildpilot_config::PlannerConfig;
use guildpilot_core::operation::OperationRegistry;
use guildpilot_core::provider::{GenerateRequest, Provider, ResponseFormat};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::dedup::CallDeduplicator;
use crate::execution_log::{ExecutionLog, ExecutionLogEntry};

pub struct Planner<'a> {
    provider: &'a dyn Provider,
    model: &'a str,
    config: &'a PlannerConfig,
}

impl<'a> Planner<'a> {
    pub fn new(provider: &'a dyn Provider, model: &'a str, config: &'a PlannerConfig) -> Self {
        Self {
            provider,
            model,
            config,
        }
    }

    /// Ordered operation names the request is expected to use.
    ///
    /// Returns an empty list when the provider fails or answers with
    /// something that is not a JSON array.
    pub async fn plan(
        &self,
        request_text: &str,
        registry: &OperationRegistry,
        dedup: &CallDeduplicator,
    ) -> Vec<String> {
        let mut available = registry.names();
        available.sort_unstable();

        let mut request = GenerateRequest::prompt(self.model, planning_prompt(request_text, &available));
        request.response_format = ResponseFormat::Json;
        request.temperature = 0.0;

        let response = match self.provider.generate(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Planner call failed, continuing without a plan");
                return Vec::new();
            }
        };

        let Some(proposed) = parse_plan(&response.text) else {
            warn!(
                response = %response.text.chars().take(200).collect::<String>(),
                "Planner returned no JSON array, continuing without a plan"
            );
            return Vec::new();
        };

        let planned = self.refine(proposed, request_text, registry, dedup);
        debug!(steps = ?planned, "Planned operations");
        planned
    }

    /// Apply the keyword heuristics, drop unknown names and collapse
    /// repeated single-execution names.
    pub fn refine(
        &self,
        mut names: Vec<String>,
        request_text: &str,
        registry: &OperationRegistry,
        dedup: &CallDeduplicator,
    ) -> Vec<String> {
        let lowered = request_text.to_lowercase();

        let search = &self.config.search_operation;
        if !search.is_empty()
            && !names.iter().any(|n| n == search)
            && mentions_any(&lowered, &self.config.search_keywords)
        {
            names.insert(0, search.clone());
        }

        if mentions_any(&lowered, &self.config.formatting_keywords) {
            for op in &self.config.formatting_operations {
                if !names.contains(op) {
                    names.push(op.clone());
                }
            }
        }

        let mut seen_single = HashSet::new();
        names
            .into_iter()
            .filter(|name| registry.get(name).is_some())
            .filter(|name| !dedup.is_single_execution(name) || seen_single.insert(name.clone()))
            .collect()
    }
}

/// Seed the log with one placeholder per planned name.
pub fn seed(log: &mut ExecutionLog, names: &[String]) {
    for name in names {
        log.append(ExecutionLogEntry::planned(name.clone()));
    }
}

fn planning_prompt(request_text: &str, available: &[&str]) -> String {
    format!(
        "You plan the steps a chat assistant will take.\n\
         Available operations: {}\n\
         Request: {:?}\n\
         Reply with only a JSON array of the operation names needed, in the order they \
         will be called, using as few as possible. Reply [] if none are needed.",
        available.join(", "),
        request_text
    )
}

fn mentions_any(lowered: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| !k.is_empty() && lowered.contains(&k.to_lowercase()))
}

/// Extract a list of names from a model reply that should be a JSON array
/// but may be wrapped in code fences or prose.
pub fn parse_plan(text: &str) -> Option<Vec<String>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    let items: Vec<Value> = serde_json::from_str(&text[start..=end]).ok()?;
    Some(
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(name),
                Value::Object(map) => map.get("name").and_then(Value::as_str).map(String::from),
                _ => None,
            })
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
    )
}
