//! Provider retry — bounded exponential backoff for transient failures.
//!
//! Rate limiting and gateway/server-unavailable responses are retried with a
//! delay that starts at the configured initial backoff and doubles on every
//! further attempt. Anything else propagates immediately.

use async_trait::async_trait;
use guildpilot_config::RetryConfig;
use guildpilot_core::error::ProviderError;
use guildpilot_core::event::{DomainEvent, EventBus};
use guildpilot_core::provider::{GenerateRequest, GenerateResponse, Provider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to try and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Policy for the main tool-calling rounds.
    pub fn main(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
        )
    }

    /// Policy for lightweight auxiliary calls (planner, fallback, summaries).
    pub fn auxiliary(config: &RetryConfig) -> Self {
        Self::new(
            config.aux_max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
        )
    }

    /// Delay before retry number `retry` (1-based): initial, 2x, 4x, ...
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::main(&RetryConfig::default())
    }
}

/// A provider that retries transient failures of the wrapped provider.
pub struct RetryingProvider {
    name: String,
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
    events: Option<Arc<EventBus>>,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self {
            name: format!("retry({})", inner.name()),
            inner,
            policy,
            events: None,
        }
    }

    /// Publish a `ProviderRetry` event for every retry.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.inner.generate(request.clone()).await {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(provider = %self.inner.name(), attempt, "Provider call recovered");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let mut delay = self.policy.backoff(attempt);
                    if let Some(secs) = e.retry_after_secs() {
                        delay = delay.max(Duration::from_secs(secs));
                    }

                    warn!(
                        provider = %self.inner.name(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider error, backing off"
                    );

                    if let Some(events) = &self.events {
                        events.publish(DomainEvent::ProviderRetry {
                            provider: self.inner.name().to_string(),
                            attempt,
                            delay_ms: delay.as_millis() as u64,
                            error_message: e.to_string(),
                            timestamp: chrono::Utc::now(),
                        });
                    }

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(
                            provider = %self.inner.name(),
                            attempts = attempt,
                            error = %e,
                            "Provider retries exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Fails with `error` for the first `failures` calls, then succeeds.
    struct FlakyProvider {
        error: ProviderError,
        failures: usize,
        call_count: Mutex<usize>,
    }

    impl FlakyProvider {
        fn new(error: ProviderError, failures: usize) -> Self {
            Self {
                error,
                failures,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(
            &self,
            _request: GenerateRequest,
        ) -> std::result::Result<GenerateResponse, ProviderError> {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            if *count <= self.failures {
                Err(self.error.clone())
            } else {
                Ok(GenerateResponse::text("ok"))
            }
        }
    }

    fn unavailable() -> ProviderError {
        ProviderError::ApiError {
            status_code: 503,
            message: "overloaded".into(),
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest::prompt("test-model", "hello")
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(16));
    }

    #[test]
    fn policies_follow_config() {
        let config = RetryConfig::default();
        assert_eq!(RetryPolicy::main(&config).max_attempts, 5);
        assert_eq!(RetryPolicy::auxiliary(&config).max_attempts, 3);
        assert_eq!(
            RetryPolicy::main(&config).initial_backoff,
            Duration::from_secs(2)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_max_minus_one_transient_failures() {
        let inner = Arc::new(FlakyProvider::new(unavailable(), 4));
        let provider = RetryingProvider::new(
            inner.clone(),
            RetryPolicy::new(5, Duration::from_secs(2)),
        );

        let start = Instant::now();
        let response = provider.generate(request()).await.unwrap();
        let waited = start.elapsed();

        assert_eq!(response.text, "ok");
        assert_eq!(inner.calls(), 5);
        // 2 + 4 + 8 + 16
        assert!(waited >= Duration::from_secs(30), "waited {waited:?}");
        assert!(waited < Duration::from_secs(31), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn non_retriable_fails_immediately() {
        let inner = Arc::new(FlakyProvider::new(
            ProviderError::ApiError {
                status_code: 400,
                message: "bad request".into(),
            },
            1,
        ));
        let provider = RetryingProvider::new(inner.clone(), RetryPolicy::default());

        let start = Instant::now();
        let err = provider.generate(request()).await.unwrap_err();

        assert!(matches!(err, ProviderError::ApiError { status_code: 400, .. }));
        assert_eq!(inner.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let inner = Arc::new(FlakyProvider::new(
            ProviderError::RateLimited {
                retry_after_secs: 0,
            },
            usize::MAX,
        ));
        let provider = RetryingProvider::new(
            inner.clone(),
            RetryPolicy::new(3, Duration::from_secs(2)),
        );

        let start = Instant::now();
        let err = provider.generate(request()).await.unwrap_err();

        assert!(matches!(err, ProviderError::RateLimited { .. }));
        assert_eq!(inner.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn honours_longer_retry_after() {
        let inner = Arc::new(FlakyProvider::new(
            ProviderError::RateLimited {
                retry_after_secs: 10,
            },
            1,
        ));
        let provider = RetryingProvider::new(
            inner.clone(),
            RetryPolicy::new(3, Duration::from_secs(2)),
        );

        let start = Instant::now();
        provider.generate(request()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_retry_events() {
        let events = Arc::new(EventBus::new(16));
        let mut rx = events.subscribe();
        let inner = Arc::new(FlakyProvider::new(unavailable(), 1));
        let provider = RetryingProvider::new(inner, RetryPolicy::default()).with_events(events);

        provider.generate(request()).await.unwrap();

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ProviderRetry {
                attempt, delay_ms, ..
            } => {
                assert_eq!(*attempt, 1);
                assert_eq!(*delay_ms, 2000);
            }
            other => panic!("expected ProviderRetry, got {other:?}"),
        }
    }
}
