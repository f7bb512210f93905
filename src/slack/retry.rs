//! Bounded retry with exponential backoff for Slack Web API calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use slack_morphism::errors::SlackClientError;
use slack_morphism::prelude::*;
use tracing::warn;

use crate::{Error, Result};

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum Failure {
    /// Slack refused the call without acting on it. `retry_after` overrides
    /// the computed backoff.
    RateLimited {
        error: Error,
        retry_after: Option<Duration>,
    },
    /// The call may or may not have taken effect (5xx, dropped connection).
    Transient(Error),
    /// Returned to the caller immediately.
    Permanent(Error),
}

impl Failure {
    /// Classify a Slack `error` code from an `ok: false` response.
    pub fn from_api_code(code: impl Into<String>) -> Self {
        let code = code.into();
        if code == "ratelimited" {
            Failure::RateLimited {
                error: Error::Slack(code),
                retry_after: None,
            }
        } else {
            Failure::Permanent(Error::Slack(code))
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        let error = Error::Slack(format!("HTTP {}", status));
        match status {
            429 => Failure::RateLimited {
                error,
                retry_after: None,
            },
            500..=599 => Failure::Transient(error),
            _ => Failure::Permanent(error),
        }
    }

    /// For calls that must not run twice: only rate limits stay retryable.
    pub fn non_idempotent(self) -> Self {
        match self {
            Failure::Transient(error) => Failure::Permanent(error),
            other => other,
        }
    }

    fn into_error(self) -> Error {
        match self {
            Failure::RateLimited { error, .. }
            | Failure::Transient(error)
            | Failure::Permanent(error) => error,
        }
    }
}

impl From<SlackClientError> for Failure {
    fn from(err: SlackClientError) -> Self {
        match err {
            SlackClientError::RateLimitError(limit) => Failure::RateLimited {
                error: Error::Slack("ratelimited".to_string()),
                retry_after: limit.retry_after,
            },
            SlackClientError::ApiError(api) => Failure::from_api_code(api.code),
            SlackClientError::HttpError(http) => Failure::from_status(http.status_code.as_u16()),
            err @ SlackClientError::HttpProtocolError(_) => {
                Failure::Transient(Error::Slack(err.to_string()))
            }
            err => Failure::Permanent(Error::Slack(err.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, with up to 25% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff);
        let jitter_ms = (base.as_millis() as u64) / 4;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    /// Run `f` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, Failure>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let (error, delay) = match f().await {
                Ok(value) => return Ok(value),
                Err(failure) if attempt + 1 >= attempts => return Err(failure.into_error()),
                Err(Failure::Permanent(error)) => return Err(error),
                Err(Failure::RateLimited { error, retry_after }) => {
                    (error, retry_after.unwrap_or_else(|| self.backoff(attempt)))
                }
                Err(Failure::Transient(error)) => (error, self.backoff(attempt)),
            };

            warn!(
                operation = operation,
                attempt = attempt + 1,
                max_attempts = attempts,
                backoff_ms = delay.as_millis() as u64,
                "Slack call failed, retrying: {}",
                error
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
