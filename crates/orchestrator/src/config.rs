//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;
use crate::retry::RetryConfig;

/// Configuration for [`EnvironmentOrchestrator`](crate::EnvironmentOrchestrator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Retry behavior for remote cluster calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Lines returned by a log fetch.
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: i64,

    /// Upper bound on a single exec call, in seconds.
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,
}

fn default_log_tail_lines() -> i64 {
    500
}

fn default_exec_timeout_secs() -> u64 {
    30
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            log_tail_lines: default_log_tail_lines(),
            exec_timeout_secs: default_exec_timeout_secs(),
        }
    }
}

impl OrchestratorConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error if any field is out of range.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        self.retry.validate()?;
        if self.log_tail_lines <= 0 {
            return Err(OrchestratorError::Validation(
                "log_tail_lines must be positive".to_string(),
            ));
        }
        if self.exec_timeout_secs == 0 {
            return Err(OrchestratorError::Validation(
                "exec_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
