//! Chat-completion errors and the retry policy for transient ones.
//!
//! Rate limits, 5xx responses and network failures are transient and may be
//! retried when the client's [`RetryPolicy`] allows it. Rejected requests
//! and malformed responses never are.

use std::time::{Duration, Instant};

use thiserror::Error;

/// Longest single wait between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited by the provider: {message}")]
    RateLimited {
        message: String,
        /// From the Retry-After header, when the provider sent one.
        retry_after: Option<Duration>,
    },

    #[error("Provider error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Bad request, auth failure, unknown model.
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Could not reach the provider: {0}")]
    Network(String),

    #[error("Unexpected response from the provider: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            429 => LlmError::RateLimited {
                message: body,
                retry_after,
            },
            400..=499 => LlmError::Rejected {
                status,
                message: body,
            },
            _ => LlmError::Server {
                status,
                message: body,
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Server { .. } | LlmError::Network(_)
        )
    }

    /// Wait before retry `attempt` (0-based).
    ///
    /// Retry-After wins; otherwise the wait doubles from a per-error base.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_secs: u64 = match self {
            LlmError::RateLimited {
                retry_after: Some(wait),
                ..
            } => return *wait,
            LlmError::RateLimited { .. } => 5,
            LlmError::Server { .. } => 2,
            _ => 1,
        };
        let secs = base_secs.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_secs(secs).min(MAX_BACKOFF)
    }
}

/// How many times, and for how long, transient failures are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Total time budget across all attempts.
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            max_elapsed: Duration::from_secs(120),
        }
    }

    /// Fail on the first error.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// The wait before another attempt, or `None` to give up.
    pub fn next_delay(&self, error: &LlmError, attempt: u32, started: Instant) -> Option<Duration> {
        if !error.is_transient() || attempt >= self.max_retries {
            return None;
        }
        let remaining = self.max_elapsed.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return None;
        }
        Some(error.backoff(attempt).min(remaining))
    }
}
