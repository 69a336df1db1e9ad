//! Bounded retry with backoff for remote cluster calls.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::OrchestratorError;

/// Retry behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Multiplier applied to the backoff after each failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error if the attempt ceiling is zero or the
    /// multiplier would shrink the backoff.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.max_attempts == 0 {
            return Err(OrchestratorError::Validation(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(OrchestratorError::Validation(
                "retry backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Context map attached to every retry log line.
pub type RetryContext = HashMap<String, String>;

/// Wraps remote calls in bounded retry-with-backoff.
///
/// Retryable errors ([`OrchestratorError::is_retryable`]) are re-run up
/// to the configured ceiling, then the last error is returned
/// unchanged. Non-retryable errors are returned after the first
/// attempt. The backoff suspends only the calling task.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from the given configuration.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute `operation`, retrying transient failures.
    ///
    /// Every attempt and the terminal outcome are logged with `label`
    /// and the caller-supplied `context`.
    ///
    /// # Errors
    /// Returns the operation's error: immediately for non-retryable
    /// kinds, after the attempt ceiling for retryable ones.
    pub async fn retry_operation<T, F, Fut>(
        &self,
        mut operation: F,
        label: &str,
        context: &RetryContext,
    ) -> Result<T, OrchestratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OrchestratorError>>,
    {
        let mut backoff_ms = self.config.initial_backoff_ms;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(label, attempt, ?context, "attempting remote operation");

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(label, attempt, ?context, "remote operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    error!(
                        label,
                        attempt,
                        error = %e,
                        ?context,
                        "remote operation failed with non-retryable error"
                    );
                    return Err(e);
                }
                Err(e) if attempt >= self.config.max_attempts => {
                    error!(
                        label,
                        attempt,
                        error = %e,
                        ?context,
                        "remote operation failed, retry budget exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        label,
                        attempt,
                        backoff_ms,
                        error = %e,
                        ?context,
                        "remote operation failed, backing off before retry"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = next_backoff(backoff_ms, self.config.backoff_multiplier);
                }
            }
        }
    }
}

fn next_backoff(current_ms: u64, multiplier: f64) -> u64 {
    let scaled = (current_ms as f64) * multiplier;
    if scaled >= u64::MAX as f64 {
        u64::MAX
    } else {
        scaled as u64
    }
}
