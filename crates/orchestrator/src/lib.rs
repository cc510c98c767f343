//! # GuildPilot Orchestrator
//!
//! Turns one inbound chat message into provider rounds and operation calls.
//!
//! A run assembles the conversation, optionally asks the light model for a
//! plan, then loops: call the provider, gate each proposed call through the
//! deduplicator, execute it, feed the result back and update the live
//! checklist. The run ends when the provider answers without calls, the
//! round limit is hit, or the loop guard trips.

pub mod checklist;
pub mod context;
pub mod dedup;
pub mod delivery;
pub mod execution_log;
pub mod executor;
pub mod fallback;
pub mod loop_runner;
pub mod planner;
pub mod settings;
pub mod signature;

pub use checklist::Checklist;
pub use context::ContextBuilder;
pub use dedup::{CallDeduplicator, Decision, DedupCaches, SkipReason};
pub use execution_log::{EntryId, EntryStatus, ExecutionLog, ExecutionLogEntry, StatusCounts};
pub use executor::{ExecutionOutcome, ExecutorSettings, OperationExecutor};
pub use fallback::FallbackGenerator;
pub use loop_runner::{Orchestrator, RunOutcome, Termination};
pub use planner::Planner;
pub use settings::OrchestratorSettings;
pub use signature::{Signature, sign};
