//! Live progress checklist rendered from the execution log.
//!
//! The first render is posted as a reply to the origin message and every
//! later render edits that message in place. Rendering and editing failures
//! are logged and swallowed; they never interrupt a run.

use guildpilot_core::platform::{ChatSurface, PostedMessage};
use serde_json::Value;
use tracing::{debug, warn};

use crate::execution_log::{EntryStatus, ExecutionLog, ExecutionLogEntry, StatusCounts};

/// Maximum characters of a result summary on one checklist line.
pub const SUMMARY_LIMIT: usize = 160;

const EMPTY_PLACEHOLDER: &str = "📋 Nothing to do yet.";
const LABEL_FIELDS: &[&str] = &["title", "name"];
const CONTENT_FIELDS: &[&str] = &[
    "value",
    "description",
    "content",
    "message",
    "text",
    "summary",
    "result",
];
const MAX_ARRAY_ITEMS: usize = 3;

/// Aggregate state shown in the checklist header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallState {
    InProgress,
    AllSucceeded,
    SomeFailed,
}

impl OverallState {
    pub fn from_counts(counts: &StatusCounts) -> Self {
        if counts.pending > 0 {
            Self::InProgress
        } else if counts.error == 0 {
            Self::AllSucceeded
        } else {
            Self::SomeFailed
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::InProgress => "⚙️ **In progress…**",
            Self::AllSucceeded => "✅ **All steps succeeded**",
            Self::SomeFailed => "⚠️ **Some steps failed**",
        }
    }
}

pub fn glyph(status: EntryStatus) -> &'static str {
    match status {
        EntryStatus::Pending => "⏳",
        EntryStatus::Success => "✅",
        EntryStatus::Error => "❌",
        EntryStatus::Skipped => "⏭️",
    }
}

/// Render the whole log, hard-truncated to `limit` characters.
pub fn render(log: &ExecutionLog, limit: usize) -> String {
    if log.is_empty() {
        return EMPTY_PLACEHOLDER.to_string();
    }

    let counts = log.counts();
    let mut lines = vec![
        OverallState::from_counts(&counts).label().to_string(),
        render_counts(&counts),
    ];
    let header = lines.len();
    lines.extend(log.ordered().into_iter().map(render_line));

    fit_lines(lines, header, limit)
}

fn render_counts(counts: &StatusCounts) -> String {
    [
        (EntryStatus::Success, counts.success),
        (EntryStatus::Error, counts.error),
        (EntryStatus::Skipped, counts.skipped),
        (EntryStatus::Pending, counts.pending),
    ]
    .iter()
    .filter(|(_, n)| *n > 0)
    .map(|(status, n)| format!("{} {n}", glyph(*status)))
    .collect::<Vec<_>>()
    .join(" · ")
}

fn render_line(entry: &ExecutionLogEntry) -> String {
    let summary = entry
        .result
        .as_ref()
        .map(summarize_result)
        .unwrap_or_default();
    if summary.is_empty() {
        format!("{} `{}`", glyph(entry.status), entry.name)
    } else {
        format!("{} `{}` — {}", glyph(entry.status), entry.name, summary)
    }
}

/// Join lines, dropping trailing ones that do not fit and hard-cutting as a
/// last resort. The first `header` lines are not entries and never count
/// toward the "more" marker.
fn fit_lines(lines: Vec<String>, header: usize, limit: usize) -> String {
    let full = lines.join("\n");
    if full.chars().count() <= limit {
        return full;
    }

    let total = lines.len();
    let mut kept = String::new();
    for (i, line) in lines.iter().enumerate() {
        let remaining = total - i.max(header);
        let marker = format!("\n… {remaining} more");
        let candidate_len = kept.chars().count() + 1 + line.chars().count();
        if candidate_len + marker.chars().count() > limit {
            kept.push_str(&marker);
            break;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(line);
    }
    truncate_chars(&kept, limit)
}

/// Human-readable, length-capped summary of an operation result.
pub fn summarize_result(result: &Value) -> String {
    truncate_chars(&summarize(result), SUMMARY_LIMIT)
}

fn summarize(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => collapse_whitespace(s),
        Value::Array(items) => summarize_array(items),
        Value::Object(map) => {
            if let Some(err) = map.get("error").filter(|v| !v.is_null()) {
                return format!("error: {}", summarize(err));
            }

            let label = LABEL_FIELDS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(collapse_whitespace);
            let content = CONTENT_FIELDS
                .iter()
                .find_map(|k| map.get(*k).filter(|v| !v.is_null()))
                .map(summarize);

            match (label, content) {
                (Some(label), Some(content)) => format!("{label}: {content}"),
                (Some(label), None) => label,
                (None, Some(content)) => content,
                (None, None) => {
                    let strings: Vec<String> = map
                        .values()
                        .filter_map(Value::as_str)
                        .take(2)
                        .map(collapse_whitespace)
                        .collect();
                    if strings.is_empty() {
                        value.to_string()
                    } else {
                        strings.join(" · ")
                    }
                }
            }
        }
    }
}

fn summarize_array(items: &[Value]) -> String {
    if items.is_empty() {
        return "(no results)".to_string();
    }
    let mut parts: Vec<String> = items
        .iter()
        .take(MAX_ARRAY_ITEMS)
        .map(summarize)
        .filter(|s| !s.is_empty())
        .collect();
    if items.len() > MAX_ARRAY_ITEMS {
        parts.push(format!("(+{} more)", items.len() - MAX_ARRAY_ITEMS));
    }
    parts.join("; ")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `s` to at most `limit` characters, ending with an ellipsis when cut.
pub fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    if limit == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(limit - 1).collect();
    out.push('…');
    out
}

/// The checklist message for one run.
#[derive(Debug)]
pub struct Checklist {
    posted: Option<PostedMessage>,
    last_rendered: Option<String>,
    limit: usize,
}

impl Checklist {
    pub fn new(limit: usize) -> Self {
        Self {
            posted: None,
            last_rendered: None,
            limit,
        }
    }

    /// Whether a checklist message has been posted.
    pub fn is_started(&self) -> bool {
        self.posted.is_some()
    }

    pub fn posted(&self) -> Option<&PostedMessage> {
        self.posted.as_ref()
    }

    /// Re-render the log and post or edit the checklist message.
    pub async fn update(&mut self, surface: &dyn ChatSurface, log: &ExecutionLog) {
        if log.is_empty() && !self.is_started() {
            return;
        }

        let body = render(log, self.limit);
        if self.last_rendered.as_deref() == Some(body.as_str()) {
            return;
        }

        match &self.posted {
            None => match surface.reply(&body).await {
                Ok(posted) => {
                    debug!(message_id = %posted.message_id, "Checklist posted");
                    self.posted = Some(posted);
                    self.last_rendered = Some(body);
                }
                Err(e) => warn!(error = %e, "Failed to post checklist"),
            },
            Some(posted) => match surface.edit(posted, &body).await {
                Ok(()) => self.last_rendered = Some(body),
                Err(e) => warn!(error = %e, "Failed to update checklist"),
            },
        }
    }
}
