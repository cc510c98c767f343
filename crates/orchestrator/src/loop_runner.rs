//! The orchestration loop.
//!
//! One run turns one inbound chat message into a sequence of provider rounds
//! and operation calls, keeps a live checklist of what happened, and sends a
//! final reply. All run state is local to [`Orchestrator::run`].

use guildpilot_config::AppConfig;
use guildpilot_core::event::{DomainEvent, EventBus};
use guildpilot_core::message::{ConversationEntry, Part, Role};
use guildpilot_core::operation::{ContextSlot, OperationCall, OperationContext, OperationRegistry};
use guildpilot_core::platform::ChatSurface;
use guildpilot_core::provider::{GenerateRequest, GenerateResponse, Provider, ResponseFormat};
use guildpilot_providers::RetryingProvider;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::checklist::{self, Checklist};
use crate::context::ContextBuilder;
use crate::dedup::{CallDeduplicator, DedupCaches, Decision};
use crate::delivery::deliver;
use crate::execution_log::{EntryStatus, ExecutionLog, ExecutionLogEntry, StatusCounts};
use crate::executor::{ExecutorSettings, OperationExecutor, result_text};
use crate::fallback::FallbackGenerator;
use crate::planner::{self, Planner};
use crate::settings::OrchestratorSettings;

/// Note recorded on entries still pending when a run ends.
pub const NOT_REACHED_NOTE: &str = "Not reached before the run ended.";

const PREVIEW_LIMIT: usize = 80;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The provider answered without proposing calls
    Answered,
    /// `max_rounds` provider rounds ran without a final answer
    RoundLimit,
    /// Too many duplicate calls were skipped
    LoopGuard,
    /// The provider failed in a way retries could not fix
    ProviderFailure,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::RoundLimit => "round_limit",
            Self::LoopGuard => "loop_guard",
            Self::ProviderFailure => "provider_failure",
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,

    /// The text that was delivered
    pub reply: String,

    pub termination: Termination,

    /// Provider rounds started
    pub rounds: u32,

    /// Main-loop provider calls that returned (retries not counted)
    pub provider_calls: u32,

    /// Final log, in display order
    pub log: Vec<ExecutionLogEntry>,

    /// Channel the reply went to instead of the origin channel
    pub redirect_channel: Option<String>,
}

/// The tool-calling orchestrator.
pub struct Orchestrator {
    /// Provider for the main tool-calling rounds
    provider: Arc<dyn Provider>,

    /// Provider for planner, fallback and limit-summary calls
    light_provider: Arc<dyn Provider>,

    registry: Arc<OperationRegistry>,

    settings: OrchestratorSettings,

    event_bus: Arc<EventBus>,

    /// Slot shared with an outside confirmation layer, if any
    context_slot: Option<ContextSlot>,
}

impl Orchestrator {
    /// Create an orchestrator with default settings. The same provider
    /// serves main and auxiliary calls.
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<OperationRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            light_provider: Arc::clone(&provider),
            provider,
            registry,
            settings: OrchestratorSettings::default(),
            event_bus,
            context_slot: None,
        }
    }

    /// Create an orchestrator configured from `config`.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        registry: Arc<OperationRegistry>,
        event_bus: Arc<EventBus>,
        config: &AppConfig,
    ) -> Self {
        Self::new(provider, registry, event_bus).with_settings(OrchestratorSettings::from(config))
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use a separate provider for lightweight auxiliary calls.
    pub fn with_light_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.light_provider = provider;
        self
    }

    /// Expose the running operation's context through `slot`.
    pub fn with_context_slot(mut self, slot: ContextSlot) -> Self {
        self.context_slot = Some(slot);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Handle one inbound message end to end and deliver the reply.
    ///
    /// Only a failure to deliver the final reply is returned as an error;
    /// provider and operation failures are absorbed into the reply.
    pub async fn run(&self, surface: &dyn ChatSurface) -> guildpilot_core::Result<RunOutcome> {
        let origin = surface.origin();
        let run_id = uuid::Uuid::new_v4().to_string();
        let settings = &self.settings;
        let display_limit = settings.display_limit.min(surface.display_limit());

        info!(
            run_id = %run_id,
            channel_id = %origin.channel_id,
            author_id = %origin.author_id,
            "Processing request"
        );
        self.event_bus.publish(DomainEvent::RequestReceived {
            run_id: run_id.clone(),
            channel_id: origin.channel_id.clone(),
            author_id: origin.author_id.clone(),
            content_preview: checklist::truncate_chars(&origin.content, PREVIEW_LIMIT),
            timestamp: chrono::Utc::now(),
        });

        let main = RetryingProvider::new(Arc::clone(&self.provider), settings.main_retry)
            .with_events(Arc::clone(&self.event_bus));
        let light = RetryingProvider::new(Arc::clone(&self.light_provider), settings.auxiliary_retry)
            .with_events(Arc::clone(&self.event_bus));

        let mut executor = OperationExecutor::new(
            Arc::clone(&self.registry),
            ExecutorSettings::from(settings),
            Arc::clone(&self.event_bus),
            run_id.clone(),
        );
        if let Some(slot) = &self.context_slot {
            executor = executor.with_context_slot(slot.clone());
        }

        let mut run = RunState {
            run_id: run_id.clone(),
            context: OperationContext::from_origin(origin),
            dedup: CallDeduplicator::new(
                settings.single_execution.iter().cloned(),
                settings.repeat_guard.clone(),
            ),
            caches: DedupCaches::new(),
            log: ExecutionLog::new(),
            checklist: Checklist::new(display_limit),
            redirect: None,
        };

        let builder = ContextBuilder::new(settings.context.clone());
        let mut conversation = builder.build(surface).await;
        let system_instruction = builder.system_instruction(origin);
        let definitions = self.registry.definitions();

        if settings.planner.enabled && !run.checklist.is_started() {
            let names = Planner::new(&light, &settings.light_model, &settings.planner)
                .plan(&origin.content, &self.registry, &run.dedup)
                .await;
            if !names.is_empty() {
                planner::seed(&mut run.log, &names);
                run.checklist.update(surface, &run.log).await;
            }
        }

        let mut rounds = 0;
        let mut provider_calls = 0;
        let (mut reply, termination) = loop {
            if rounds >= settings.max_rounds {
                warn!(run_id = %run_id, rounds, "Round limit reached");
                let reply = self.limit_reply(&light, &run.log).await;
                break (reply, Termination::RoundLimit);
            }
            rounds += 1;
            debug!(run_id = %run_id, round = rounds, "Orchestration round");

            let request = GenerateRequest {
                model: settings.model.clone(),
                system_instruction: Some(system_instruction.clone()),
                contents: conversation.entries.clone(),
                operations: definitions.clone(),
                temperature: settings.temperature,
                response_format: ResponseFormat::Text,
            };

            let response = match main.generate(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "Provider call failed, ending run");
                    break (provider_failure_message(), Termination::ProviderFailure);
                }
            };
            provider_calls += 1;

            if !response.has_calls() {
                break (response.text, Termination::Answered);
            }

            debug!(run_id = %run_id, calls = response.calls.len(), "Executing proposed calls");
            conversation.push(model_turn(&response));

            let mut processed = 0;
            for call in &response.calls {
                let result = run.process_call(call, &executor, &self.event_bus).await;
                conversation.push(ConversationEntry::user(result_turn(&call.name, &result)));
                run.checklist.update(surface, &run.log).await;
                processed += 1;

                if run.caches.skip_count() >= settings.loop_guard_threshold {
                    break;
                }
            }

            // The rest of the round is dropped once the guard trips.
            if run.caches.skip_count() >= settings.loop_guard_threshold {
                info!(
                    run_id = %run_id,
                    skips = run.caches.skip_count(),
                    ignored_calls = response.calls.len() - processed,
                    "Loop guard tripped, ignoring remaining calls"
                );
                break (response.text, Termination::LoopGuard);
            }
        };

        let leftover = run.log.finalize_pending(NOT_REACHED_NOTE);
        if leftover > 0 {
            debug!(run_id = %run_id, leftover, "Finalized pending entries");
        }
        run.checklist.update(surface, &run.log).await;

        if reply.trim().is_empty() {
            reply = FallbackGenerator::new(&light, &settings.light_model)
                .generate(&origin.content)
                .await;
        }
        let reply = reply.trim().to_string();

        deliver(surface, &reply, run.redirect.as_deref(), display_limit).await?;

        info!(
            run_id = %run_id,
            termination = termination.as_str(),
            rounds,
            operations = run.log.len(),
            "Request complete"
        );
        self.event_bus.publish(DomainEvent::RunCompleted {
            run_id: run_id.clone(),
            termination: termination.as_str().to_string(),
            rounds,
            operations: run.log.len(),
            timestamp: chrono::Utc::now(),
        });

        Ok(RunOutcome {
            run_id,
            reply,
            termination,
            rounds,
            provider_calls,
            log: run.log.snapshot(),
            redirect_channel: run.redirect,
        })
    }

    /// Deterministic round-limit message, optionally reworded by the light
    /// model.
    async fn limit_reply(&self, light: &dyn Provider, log: &ExecutionLog) -> String {
        let message = limit_message(self.settings.max_rounds, &log.counts());
        if !self.settings.summarize_on_limit {
            return message;
        }

        let steps: Vec<String> = log
            .ordered()
            .iter()
            .map(|e| format!("- {} ({})", e.name, e.status.as_str()))
            .collect();
        let prompt = format!(
            "A chat assistant stopped after reaching its step limit. In two or three sentences, \
             tell the user what was done and that they can ask it to continue.\n\nSteps:\n{}",
            steps.join("\n")
        );
        match light
            .generate(GenerateRequest::prompt(&self.settings.light_model, prompt))
            .await
        {
            Ok(response) if !response.text.trim().is_empty() => response.text,
            Ok(_) => message,
            Err(e) => {
                warn!(error = %e, "Limit summary failed, using fixed message");
                message
            }
        }
    }
}

/// Per-run mutable state.
struct RunState {
    run_id: String,
    context: OperationContext,
    dedup: CallDeduplicator,
    caches: DedupCaches,
    log: ExecutionLog,
    checklist: Checklist,
    redirect: Option<String>,
}

impl RunState {
    /// Gate, execute and record one proposed call. Returns the result the
    /// provider will see.
    async fn process_call(
        &mut self,
        call: &OperationCall,
        executor: &OperationExecutor,
        events: &EventBus,
    ) -> Value {
        let id = self.log.locate_or_append(&call.name, call.args.as_ref());

        let (result, status) = match self.dedup.check(call, &mut self.caches) {
            Decision::Skip { reason, result } => {
                info!(
                    run_id = %self.run_id,
                    operation = %call.name,
                    reason = reason.as_str(),
                    "Skipping call"
                );
                events.publish(DomainEvent::OperationSkipped {
                    run_id: self.run_id.clone(),
                    operation: call.name.clone(),
                    reason: reason.as_str().to_string(),
                    timestamp: chrono::Utc::now(),
                });
                (result, EntryStatus::Skipped)
            }
            Decision::Execute => {
                let outcome = executor.execute(call, &self.context).await;
                if outcome.resolved {
                    self.dedup.record(call, &outcome.result, &mut self.caches);
                }
                if let Some(channel) = outcome.replacement_channel {
                    info!(run_id = %self.run_id, channel = %channel, "Origin channel replaced");
                    self.redirect = Some(channel);
                }
                (outcome.result, outcome.status)
            }
        };

        self.log.finalize(id, status, result.clone());
        result
    }
}

/// The model turn recording what the provider proposed this round.
fn model_turn(response: &GenerateResponse) -> ConversationEntry {
    let mut parts = Vec::with_capacity(response.calls.len() + 1);
    if !response.text.trim().is_empty() {
        parts.push(Part::text(response.text.clone()));
    }
    parts.extend(response.calls.iter().cloned().map(Part::Call));
    ConversationEntry {
        role: Role::Model,
        parts,
        timestamp: chrono::Utc::now(),
    }
}

/// The synthetic user turn carrying a call's result back to the provider.
pub fn result_turn(name: &str, result: &Value) -> String {
    format!("{name} result: {}", result_text(result))
}

/// Reply used when `max_rounds` runs out.
pub fn limit_message(max_rounds: u32, counts: &StatusCounts) -> String {
    format!(
        "I reached my processing limit of {max_rounds} rounds before finishing. \
         {} step(s) succeeded, {} failed and {} were skipped. \
         Ask me to continue if something is still missing.",
        counts.success, counts.error, counts.skipped
    )
}

/// Reply used when the provider cannot be reached.
pub fn provider_failure_message() -> String {
    "Sorry, I couldn't reach the language model to finish your request. \
     Please try again in a moment."
        .to_string()
}
