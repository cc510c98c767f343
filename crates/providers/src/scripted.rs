//! Scripted provider — replays recorded responses in order.
//!
//! Used for dry runs of the orchestrator without a live model: the script
//! lists what the model "said" each round, and the real loop, dedup and
//! checklist machinery run against it.

use async_trait::async_trait;
use guildpilot_core::error::ProviderError;
use guildpilot_core::provider::{GenerateRequest, GenerateResponse, Provider};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// One recorded provider turn.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    /// Simulated API failure
    Fail { error_status: u16, message: String },
    Respond(GenerateResponse),
}

impl ScriptStep {
    fn into_result(self) -> Result<GenerateResponse, ProviderError> {
        match self {
            Self::Fail {
                error_status,
                message,
            } => Err(ProviderError::ApiError {
                status_code: error_status,
                message,
            }),
            Self::Respond(response) => Ok(response),
        }
    }
}

impl From<GenerateResponse> for ScriptStep {
    fn from(response: GenerateResponse) -> Self {
        Self::Respond(response)
    }
}

/// A script file: the default queue plus optional per-model queues.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub responses: Vec<ScriptStep>,

    /// Queues consumed only by requests for the named model
    #[serde(default)]
    pub by_model: HashMap<String, Vec<ScriptStep>>,
}

/// A provider that answers from prerecorded queues.
pub struct ScriptedProvider {
    default_queue: Mutex<VecDeque<ScriptStep>>,
    model_queues: Mutex<HashMap<String, VecDeque<ScriptStep>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            default_queue: Mutex::new(steps.into()),
            model_queues: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for tests: every step is a successful response.
    pub fn responses(responses: Vec<GenerateResponse>) -> Self {
        Self::new(responses.into_iter().map(ScriptStep::from).collect())
    }

    /// Route requests for `model` to their own queue.
    pub fn with_model_queue(self, model: impl Into<String>, steps: Vec<ScriptStep>) -> Self {
        self.model_queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(model.into(), steps.into());
        self
    }

    pub fn from_script(script: Script) -> Self {
        script
            .by_model
            .into_iter()
            .fold(Self::new(script.responses), |provider, (model, steps)| {
                provider.with_model_queue(model, steps)
            })
    }

    /// Load a JSON script file.
    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::NotConfigured(format!("cannot read script {}: {e}", path.display()))
        })?;
        let script: Script = serde_json::from_str(&content).map_err(|e| {
            ProviderError::NotConfigured(format!("invalid script {}: {e}", path.display()))
        })?;
        Ok(Self::from_script(script))
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError> {
        let model = request.model.clone();
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let step = {
            let mut queues = self.model_queues.lock().unwrap_or_else(|e| e.into_inner());
            match queues.get_mut(&model) {
                Some(queue) => queue.pop_front(),
                None => self
                    .default_queue
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .pop_front(),
            }
        };

        debug!(model = %model, scripted = step.is_some(), "Scripted provider turn");

        match step {
            Some(step) => step.into_result(),
            None => Err(ProviderError::NotConfigured(format!(
                "script exhausted for model '{model}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn replays_in_order_then_exhausts() {
        let provider = ScriptedProvider::responses(vec![
            GenerateResponse::text("first"),
            GenerateResponse::text("second"),
        ]);
        let req = GenerateRequest::prompt("m", "hi");

        assert_eq!(provider.generate(req.clone()).await.unwrap().text, "first");
        assert_eq!(provider.generate(req.clone()).await.unwrap().text, "second");
        assert!(matches!(
            provider.generate(req).await,
            Err(ProviderError::NotConfigured(_))
        ));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn model_queue_is_separate() {
        let provider = ScriptedProvider::responses(vec![GenerateResponse::text("main")])
            .with_model_queue("light", vec![GenerateResponse::text(r#"["search"]"#).into()]);

        let light = provider
            .generate(GenerateRequest::prompt("light", "plan"))
            .await
            .unwrap();
        let main = provider
            .generate(GenerateRequest::prompt("heavy", "go"))
            .await
            .unwrap();
        assert_eq!(light.text, r#"["search"]"#);
        assert_eq!(main.text, "main");
    }

    #[tokio::test]
    async fn loads_script_file_with_failures() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "responses": [
                    {{"error_status": 503, "message": "busy"}},
                    {{"calls": [{{"name": "sendMessage", "args": {{"text": "hello"}}}}]}},
                    {{"text": "Done!"}}
                ]
            }}"#
        )
        .unwrap();

        let provider = ScriptedProvider::from_file(file.path()).unwrap();
        let req = GenerateRequest::prompt("m", "hi");

        let err = provider.generate(req.clone()).await.unwrap_err();
        assert!(err.is_transient());
        let calls = provider.generate(req.clone()).await.unwrap();
        assert_eq!(calls.calls[0].name, "sendMessage");
        assert_eq!(provider.generate(req).await.unwrap().text, "Done!");
    }
}
