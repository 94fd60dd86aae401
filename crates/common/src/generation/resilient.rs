//! Resilient client around a generative backend
//!
//! Applies two orthogonal guards to every call:
//! - bounded retries with exponential backoff and jitter, skipped for
//!   failures classified as non-retryable (auth, malformed request)
//! - a circuit breaker that fails fast once the dependency looks down
//!
//! One client instance per process per logical dependency; the breaker
//! state lives inside it and is shared by every caller holding the Arc.

use crate::errors::{AppError, Result};
use crate::generation::breaker::{BreakerConfig, CircuitBreaker};
use crate::generation::{ChatMessage, GeneratedImage, GenerativeBackend};
use crate::metrics;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Retry tuning knobs
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per call, first try included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Backoff multiplier between retries
    pub multiplier: f64,
    /// Jitter applied to each delay
    pub randomization_factor: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            multiplier: 2.0,
            randomization_factor: 0.3,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(self.randomization_factor)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Generative backend wrapper with retry and circuit breaking
pub struct ResilientClient {
    backend: Arc<dyn GenerativeBackend>,
    breaker: CircuitBreaker,
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        breaker_config: BreakerConfig,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            breaker: CircuitBreaker::new(breaker_config),
            policy,
        }
    }

    /// Generate a text completion
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.execute("complete", || self.backend.complete(messages))
            .await
    }

    /// Generate an image
    pub async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage> {
        self.execute("generate_image", || self.backend.generate_image(prompt))
            .await
    }

    /// Access the breaker (for probes and tests)
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn execute<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, super::BackendError>>,
    {
        if let Err(remaining) = self.breaker.try_acquire() {
            metrics::record_generation(op, false);
            return Err(AppError::CircuitOpen {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        let mut backoff = self.policy.backoff();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match call().await {
                Ok(value) => {
                    self.breaker.record_success();
                    metrics::record_generation(op, true);
                    return Ok(value);
                }
                Err(err) => {
                    let retryable = err.is_retryable();

                    if retryable && attempt < self.policy.max_attempts {
                        let delay = backoff.next_backoff().unwrap_or(self.policy.max_delay);
                        warn!(
                            op,
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            status = ?err.status(),
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "Generation call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    // One breaker failure per logical call, not per attempt.
                    let tripped = self.breaker.record_failure();
                    if tripped {
                        metrics::record_breaker_open();
                    }
                    metrics::record_generation(op, false);
                    warn!(
                        op,
                        attempt,
                        retryable,
                        status = ?err.status(),
                        error = %err,
                        breaker_tripped = tripped,
                        "Generation call failed"
                    );
                    return Err(AppError::Generation {
                        message: format!("{} failed after {} attempt(s): {}", op, attempt, err),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::BackendError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Backend that plays back a scripted sequence of outcomes
    struct ScriptedBackend {
        calls: AtomicU32,
        script: Mutex<Vec<std::result::Result<String, u16>>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<std::result::Result<String, u16>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script: Mutex::new(script),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedBackend {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
        ) -> std::result::Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Ok("ok".to_string());
            }
            match script.remove(0) {
                Ok(text) => Ok(text),
                Err(status) => Err(BackendError::Http {
                    status,
                    message: "scripted failure".to_string(),
                }),
            }
        }

        async fn generate_image(
            &self,
            _prompt: &str,
        ) -> std::result::Result<GeneratedImage, BackendError> {
            Err(BackendError::InvalidResponse {
                message: "not scripted".to_string(),
            })
        }

        fn text_model(&self) -> &str {
            "scripted"
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            randomization_factor: 0.0,
            max_delay: Duration::from_millis(2),
        }
    }

    fn client_with(
        backend: Arc<ScriptedBackend>,
        threshold: u32,
        cooldown: Duration,
        max_attempts: u32,
    ) -> ResilientClient {
        ResilientClient::new(
            backend,
            BreakerConfig {
                failure_threshold: threshold,
                cooldown,
            },
            fast_policy(max_attempts),
        )
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(503),
            Err(429),
            Ok("answer".to_string()),
        ]));
        let client = client_with(backend.clone(), 5, Duration::from_secs(60), 3);

        let result = client.complete(&[ChatMessage::user("q")]).await.unwrap();

        assert_eq!(result, "answer");
        assert_eq!(backend.calls(), 3);
        assert_eq!(client.breaker().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_makes_exactly_one_attempt() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(401)]));
        let client = client_with(backend.clone(), 5, Duration::from_secs(60), 3);

        let err = client.complete(&[ChatMessage::user("q")]).await.unwrap_err();

        assert!(matches!(err, AppError::Generation { .. }));
        assert_eq!(backend.calls(), 1);
        assert_eq!(client.breaker().consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_breaker_trips_after_threshold_and_fails_fast() {
        // Five logical calls, each a non-retryable failure.
        let backend = Arc::new(ScriptedBackend::new(vec![Err(400); 5]));
        let client = client_with(backend.clone(), 5, Duration::from_secs(60), 3);

        for _ in 0..5 {
            let _ = client.complete(&[ChatMessage::user("q")]).await;
        }
        assert_eq!(backend.calls(), 5);

        // Sixth call: refused without touching the backend.
        let err = client.complete(&[ChatMessage::user("q")]).await.unwrap_err();
        match err {
            AppError::CircuitOpen { retry_after_secs } => assert!(retry_after_secs > 0),
            other => panic!("expected CircuitOpen, got {:?}", other),
        }
        assert_eq!(backend.calls(), 5);
    }

    #[tokio::test]
    async fn test_breaker_recovers_after_cooldown() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(400),
            Err(400),
            Ok("back".to_string()),
        ]));
        let client = client_with(backend.clone(), 2, Duration::from_millis(20), 1);

        let _ = client.complete(&[ChatMessage::user("q")]).await;
        let _ = client.complete(&[ChatMessage::user("q")]).await;
        assert_eq!(client.breaker().state(), super::super::BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        // Trial call is admitted and succeeds; the counter resets.
        let result = client.complete(&[ChatMessage::user("q")]).await.unwrap();
        assert_eq!(result, "back");
        assert_eq!(client.breaker().state(), super::super::BreakerState::Closed);
        assert_eq!(client.breaker().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_success_resets_counter_even_after_failed_attempts() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(503),
            Ok("eventually".to_string()),
        ]));
        let client = client_with(backend.clone(), 5, Duration::from_secs(60), 3);

        client.complete(&[ChatMessage::user("q")]).await.unwrap();

        assert_eq!(client.breaker().consecutive_failures(), 0);
    }
}
