//! The execution log: an ordered record of every call made or skipped
//! during one orchestration run.
//!
//! Entries live in an arena and are addressed by [`EntryId`]. Each entry gets
//! a `planned_order` when inserted and a `sequence` the first time it leaves
//! `Pending`; display order sorts by sequence, then planned order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::signature::{Signature, sign};

/// Stable handle to a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Success,
    Error,
    Skipped,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One call, planned, executed or skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub name: String,

    /// Arguments as proposed; `None` if the provider sent none
    pub args: Option<Value>,

    pub status: EntryStatus,

    /// Handler result, skip notice, or error object
    pub result: Option<Value>,

    /// Completion order across the run; set once when leaving `Pending`
    pub sequence: Option<u64>,

    /// Insertion order; breaks display ties
    pub planned_order: usize,

    /// Seeded by the planner before real arguments were known
    #[serde(default)]
    pub placeholder: bool,
}

impl ExecutionLogEntry {
    /// A fresh pending entry for a real call.
    pub fn pending(name: impl Into<String>, args: Option<Value>) -> Self {
        Self {
            name: name.into(),
            args,
            status: EntryStatus::Pending,
            result: None,
            sequence: None,
            planned_order: 0,
            placeholder: false,
        }
    }

    /// A pending entry seeded by the planner.
    pub fn planned(name: impl Into<String>) -> Self {
        Self {
            args: Some(serde_json::json!({ "planned": true })),
            placeholder: true,
            ..Self::pending(name, None)
        }
    }

    pub fn signature(&self) -> Signature {
        sign(&self.name, self.args.as_ref())
    }

    /// Sort key: completed entries by sequence, then the rest by planned order.
    pub fn effective_order(&self) -> (bool, u64, usize) {
        match self.sequence {
            Some(seq) => (false, seq, self.planned_order),
            None => (true, 0, self.planned_order),
        }
    }
}

/// Per-status tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub success: usize,
    pub error: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.success + self.error + self.skipped
    }
}

/// The log for one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Vec<ExecutionLogEntry>,
    next_sequence: u64,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, assigning its planned order.
    pub fn append(&mut self, mut entry: ExecutionLogEntry) -> EntryId {
        entry.planned_order = self.entries.len();
        self.entries.push(entry);
        EntryId(self.entries.len() - 1)
    }

    pub fn get(&self, id: EntryId) -> Option<&ExecutionLogEntry> {
        self.entries.get(id.0)
    }

    /// First pending entry named `name` that satisfies `predicate`.
    pub fn find_pending<F>(&self, name: &str, predicate: F) -> Option<EntryId>
    where
        F: Fn(&ExecutionLogEntry) -> bool,
    {
        self.entries
            .iter()
            .position(|e| e.status == EntryStatus::Pending && e.name == name && predicate(e))
            .map(EntryId)
    }

    /// Overwrite the first pending planner placeholder for `name` with real
    /// arguments, keeping its planned order.
    pub fn claim_placeholder(&mut self, name: &str, args: Option<Value>) -> Option<EntryId> {
        let id = self.find_pending(name, |e| e.placeholder)?;
        let entry = &mut self.entries[id.0];
        entry.args = args;
        entry.placeholder = false;
        Some(id)
    }

    /// Locate the entry a proposed call should be recorded against:
    /// a pending entry with the same signature, else a planner placeholder,
    /// else a new entry.
    pub fn locate_or_append(&mut self, name: &str, args: Option<&Value>) -> EntryId {
        let signature = sign(name, args);
        if let Some(id) = self.find_pending(name, |e| !e.placeholder && e.signature() == signature)
        {
            return id;
        }
        if let Some(id) = self.claim_placeholder(name, args.cloned()) {
            return id;
        }
        self.append(ExecutionLogEntry::pending(name, args.cloned()))
    }

    /// Record a terminal status. No-op if the entry is already terminal.
    ///
    /// Returns whether the entry changed.
    pub fn finalize(&mut self, id: EntryId, status: EntryStatus, result: Value) -> bool {
        let Some(entry) = self.entries.get_mut(id.0) else {
            return false;
        };
        if entry.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        entry.status = status;
        entry.result = Some(result);
        entry.sequence = Some(self.next_sequence);
        self.next_sequence += 1;
        true
    }

    /// Force every still-pending entry to `Skipped` with `note`.
    ///
    /// Returns how many entries were finalized.
    pub fn finalize_pending(&mut self, note: &str) -> usize {
        let pending: Vec<EntryId> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status == EntryStatus::Pending)
            .map(|(i, _)| EntryId(i))
            .collect();
        for id in &pending {
            self.finalize(*id, EntryStatus::Skipped, Value::String(note.to_string()));
        }
        pending.len()
    }

    /// Entries in display order.
    pub fn ordered(&self) -> Vec<&ExecutionLogEntry> {
        let mut ordered: Vec<&ExecutionLogEntry> = self.entries.iter().collect();
        ordered.sort_by_key(|e| e.effective_order());
        ordered
    }

    pub fn counts(&self) -> StatusCounts {
        self.entries
            .iter()
            .fold(StatusCounts::default(), |mut counts, e| {
                match e.status {
                    EntryStatus::Pending => counts.pending += 1,
                    EntryStatus::Success => counts.success += 1,
                    EntryStatus::Error => counts.error += 1,
                    EntryStatus::Skipped => counts.skipped += 1,
                }
                counts
            })
    }

    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(|e| e.status == EntryStatus::Pending)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owned copy of the entries in display order.
    pub fn snapshot(&self) -> Vec<ExecutionLogEntry> {
        self.ordered().into_iter().cloned().collect()
    }
}
