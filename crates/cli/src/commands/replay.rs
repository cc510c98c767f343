//! `guildpilot replay` — Run one request through the orchestrator offline.
//!
//! The script file is JSON. Provider turns come from `responses` (and
//! `by_model` for the light model); `operations` declares the handlers the
//! model may call and what each returns; `history` seeds the channel.
//!
//! ```json
//! {
//!   "responses": [
//!     { "calls": [{ "name": "createRole", "args": { "name": "Mods" } }] },
//!     { "text": "Created the Mods role." }
//!   ],
//!   "by_model": { "gemini-2.5-flash-lite": [{ "text": "[\"createRole\"]" }] },
//!   "operations": {
//!     "createRole": { "description": "Create a role", "result": { "id": "42" } }
//!   }
//! }
//! ```

use async_trait::async_trait;
use chrono::Utc;
use clap::Args;
use guildpilot_core::error::OperationError;
use guildpilot_core::event::{DomainEvent, EventBus};
use guildpilot_core::operation::{Operation, OperationContext, OperationRegistry};
use guildpilot_core::platform::{HistoryMessage, OriginMessage};
use guildpilot_orchestrator::{Orchestrator, OrchestratorSettings, RunOutcome};
use guildpilot_providers::ScriptedProvider;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::console::ConsoleSurface;

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// JSON script with provider turns and operation results
    #[arg(short, long)]
    pub script: PathBuf,

    /// The chat message to handle
    #[arg(short, long)]
    pub message: String,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Skip the planning pre-pass
    #[arg(long)]
    pub no_plan: bool,

    /// Do not pause between operations
    #[arg(long)]
    pub no_pacing: bool,

    /// Display name of the requesting user
    #[arg(long, default_value = "operator")]
    pub author: String,

    /// Channel id the request comes from
    #[arg(long, default_value = "console")]
    pub channel: String,

    /// Server id; omit to simulate a direct message
    #[arg(long)]
    pub guild: Option<String>,

    /// Print the full run outcome as JSON after the summary
    #[arg(long)]
    pub report: bool,

    /// Print only the summary, not the simulated chat messages
    #[arg(short, long)]
    pub quiet: bool,
}

/// The non-provider parts of a script file.
#[derive(Debug, Default, Deserialize)]
pub struct ReplayFixture {
    #[serde(default)]
    pub operations: BTreeMap<String, OperationFixture>,

    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

/// What a scripted operation reports when called.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationFixture {
    #[serde(default)]
    pub description: String,

    /// Returned on every call; defaults to `"done"`
    #[serde(default)]
    pub result: Option<Value>,

    /// When set, every call fails with this reason instead
    #[serde(default)]
    pub error: Option<String>,
}

/// An operation whose behavior is fixed by the script.
pub struct ScriptedOperation {
    name: String,
    fixture: OperationFixture,
}

impl ScriptedOperation {
    pub fn new(name: impl Into<String>, fixture: OperationFixture) -> Self {
        Self {
            name: name.into(),
            fixture,
        }
    }
}

#[async_trait]
impl Operation for ScriptedOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.fixture.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(
        &self,
        _arguments: Value,
        _context: &OperationContext,
    ) -> Result<Value, OperationError> {
        match &self.fixture.error {
            Some(reason) => Err(OperationError::ExecutionFailed {
                operation: self.name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(self
                .fixture
                .result
                .clone()
                .unwrap_or_else(|| Value::String("done".into()))),
        }
    }
}

pub fn load_fixture(path: &Path) -> Result<ReplayFixture, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read script {}: {e}", path.display()))?;
    let fixture = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid script {}: {e}", path.display()))?;
    Ok(fixture)
}

pub fn build_registry(fixture: &ReplayFixture) -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    for (name, spec) in &fixture.operations {
        registry.register(Box::new(ScriptedOperation::new(name, spec.clone())));
    }
    registry
}

pub fn origin_message(args: &ReplayArgs) -> OriginMessage {
    OriginMessage {
        id: "0".into(),
        channel_id: args.channel.clone(),
        guild_id: args.guild.clone(),
        author_id: args.author.clone(),
        author_name: args.author.clone(),
        content: args.message.clone(),
        attachments: Vec::new(),
        timestamp: Utc::now(),
    }
}

/// Apply command-line switches on top of configured settings.
pub fn apply_overrides(mut settings: OrchestratorSettings, args: &ReplayArgs) -> OrchestratorSettings {
    if args.no_plan {
        settings.planner.enabled = false;
    }
    if args.no_pacing {
        settings.pacing = Duration::ZERO;
    }
    settings
}

/// Human-readable run summary.
pub fn summary(outcome: &RunOutcome, retries: usize) -> String {
    let mut lines = vec![
        format!("Run:          {}", outcome.run_id),
        format!("Ended:        {}", outcome.termination.as_str()),
        format!("Rounds:       {}", outcome.rounds),
        format!("Model calls:  {}", outcome.provider_calls),
        format!("Retries:      {retries}"),
    ];
    if let Some(channel) = &outcome.redirect_channel {
        lines.push(format!("Redirected:   #{channel}"));
    }
    lines.push("Operations:".to_string());
    if outcome.log.is_empty() {
        lines.push("  (none)".to_string());
    }
    for entry in &outcome.log {
        lines.push(format!("  {:<10} {}", entry.status.as_str(), entry.name));
    }
    lines.join("\n")
}

pub async fn run(args: ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::config_cmd::load(args.config.as_deref())
        .map_err(|e| format!("Failed to load config: {e}"))?;

    let provider = Arc::new(ScriptedProvider::from_file(&args.script)?);
    let fixture = load_fixture(&args.script)?;
    let registry = Arc::new(build_registry(&fixture));
    tracing::info!(
        operations = registry.len(),
        script = %args.script.display(),
        "Replay script loaded"
    );

    let event_bus = Arc::new(EventBus::default());
    let mut events = event_bus.subscribe();

    let settings = apply_overrides(OrchestratorSettings::from(&config), &args);
    let orchestrator = Orchestrator::new(provider, registry, Arc::clone(&event_bus))
        .with_settings(settings);

    let mut surface = ConsoleSurface::new(origin_message(&args)).with_history(fixture.history);
    if args.quiet {
        surface = surface.quiet();
    }
    let outcome = orchestrator.run(&surface).await?;

    let mut retries = 0;
    loop {
        match events.try_recv() {
            Ok(event) => {
                if matches!(event.as_ref(), DomainEvent::ProviderRetry { .. }) {
                    retries += 1;
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    println!("{}", summary(&outcome, retries));
    println!("Chat writes:  {}", surface.transcript().len());
    if args.report {
        println!();
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    Ok(())
}
