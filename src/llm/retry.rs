//! Bounded retry with exponential backoff for model calls

use super::LlmError;
use crate::config::LlmConfig;
use std::future::Future;
use std::time::Duration;

/// Retry schedule for one logical model call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound for each attempt
    pub timeout: Duration,
}

/// Final error of a call that did not succeed
#[derive(Debug, Clone, PartialEq)]
pub struct CallFailure {
    pub attempts: u32,
    pub error: LlmError,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, CallFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff(attempt - 1);
                    tracing::warn!(
                        operation,
                        attempt,
                        error = %error,
                        "Model call failed; retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(CallFailure {
                        attempts: attempt,
                        error,
                    })
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(240),
        }
    }
}
