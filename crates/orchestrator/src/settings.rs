//! Runtime settings resolved from [`AppConfig`].

use guildpilot_config::{AppConfig, ContextConfig, PlannerConfig};
use guildpilot_providers::RetryPolicy;
use std::time::Duration;

/// Everything one orchestration run needs to know about limits and models.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Model for the main tool-calling rounds
    pub model: String,

    /// Model for planner, fallback and limit-summary calls
    pub light_model: String,

    pub temperature: f32,

    pub max_rounds: u32,

    /// Dedup skips tolerated before the loop is forced to stop
    pub loop_guard_threshold: u32,

    /// Pause after every executed operation
    pub pacing: Duration,

    pub display_limit: usize,

    pub single_execution: Vec<String>,
    pub repeat_guard: Option<String>,
    pub channel_defaulted: Vec<String>,
    pub channel_replace: Option<String>,

    /// Ask the light model to word the round-limit message
    pub summarize_on_limit: bool,

    pub main_retry: RetryPolicy,
    pub auxiliary_retry: RetryPolicy,

    pub planner: PlannerConfig,
    pub context: ContextConfig,
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        let orchestrator = &config.orchestrator;
        Self {
            model: config.provider.model.clone(),
            light_model: config.provider.light_model.clone(),
            temperature: config.provider.temperature,
            max_rounds: orchestrator.max_rounds,
            loop_guard_threshold: orchestrator.loop_guard_threshold,
            pacing: Duration::from_millis(orchestrator.pacing_ms),
            display_limit: orchestrator.display_limit,
            single_execution: orchestrator.single_execution.clone(),
            repeat_guard: orchestrator.repeat_guard.clone(),
            channel_defaulted: orchestrator.channel_defaulted.clone(),
            channel_replace: orchestrator.channel_replace.clone(),
            summarize_on_limit: orchestrator.summarize_on_limit,
            main_retry: RetryPolicy::main(&config.retry),
            auxiliary_retry: RetryPolicy::auxiliary(&config.retry),
            planner: config.planner.clone(),
            context: config.context.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}
