use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::RetryConfig;
use crate::errors::AutomationError;
use crate::failure_log::{FailureLog, FailureLogEntry};

/// Attempt, log, back off, escalate.
///
/// Every failed attempt lands in the shared [`FailureLog`]. The log is an
/// audit trail only and never influences whether another attempt is made.
#[derive(Clone, Debug)]
pub struct RetryOrchestrator {
    max_attempts: u32,
    base_delay: Duration,
    log: FailureLog,
}

impl RetryOrchestrator {
    pub fn new(config: &RetryConfig, log: FailureLog) -> Self {
        Self { max_attempts: config.max_attempts, base_delay: config.base_delay(), log }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay slept after the failed zero-based `attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `action` with the configured attempt budget.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, action: F) -> Result<T, AutomationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_with_attempts(operation, self.max_attempts, action).await
    }

    /// Runs `action` up to `max_attempts` times. The closure receives the
    /// zero-based attempt number. A budget of zero is treated as one.
    pub async fn run_with_attempts<T, E, F, Fut>(
        &self,
        operation: &str,
        max_attempts: u32,
        mut action: F,
    ) -> Result<T, AutomationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let message = match action(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            event_name = "satbot.retry.recovered",
                            operation,
                            attempt = attempt + 1,
                            "operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error.to_string(),
            };

            let mut context = json!({
                "operation": operation,
                "attempt": attempt + 1,
                "max_attempts": max_attempts,
            });

            if attempt + 1 >= max_attempts {
                self.log.record(FailureLogEntry::new(message.clone(), context));
                error!(
                    event_name = "satbot.retry.exhausted",
                    operation,
                    attempts = max_attempts,
                    error = %message,
                    "operation failed on every attempt"
                );
                return Err(AutomationError::RetriesExhausted { attempts: max_attempts, message });
            }

            let delay = self.backoff_delay(attempt);
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            context["delay_ms"] = json!(delay_ms);
            self.log.record(FailureLogEntry::new(message.clone(), context));
            warn!(
                event_name = "satbot.retry.attempt_failed",
                operation,
                attempt = attempt + 1,
                max_attempts,
                delay_ms,
                error = %message,
                "operation failed, retrying"
            );

            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Records a failure without retrying anything.
    pub fn log_only(&self, error: impl Display, context: Value) {
        let message = error.to_string();
        warn!(event_name = "satbot.retry.logged", error = %message, "failure recorded");
        self.log.record(FailureLogEntry::new(message, context));
    }

    pub fn errors(&self) -> Vec<FailureLogEntry> {
        self.log.entries()
    }

    pub fn reset(&self) {
        self.log.reset();
    }

    pub fn failure_log(&self) -> &FailureLog {
        &self.log
    }
}
