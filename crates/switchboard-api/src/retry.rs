//! Backoff policy for chat-completions requests.

use rand::Rng;
use std::time::Duration;
use switchboard_types::AgentError;

/// How often and how patiently the client re-sends a failed completion.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per request, the first one included. At least one is
    /// always made.
    pub max_attempts: u32,
    /// Wait before the second attempt; doubled for each attempt after it.
    pub base_delay: Duration,
    /// Ceiling for any single wait, including a server-supplied `Retry-After`.
    pub max_delay: Duration,
    /// Fraction of the computed wait to randomize by, in either direction.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// Whether a request that failed on attempt `attempt` (0-based) with
    /// `error` gets another try.
    pub fn should_retry(&self, attempt: u32, error: &AgentError) -> bool {
        is_retryable(error) && attempt + 1 < self.max_attempts
    }

    /// Wait before the attempt after `attempt` (0-based).
    ///
    /// A `Retry-After` from the endpoint wins over the computed backoff.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(requested) = retry_after {
            return requested.min(self.max_delay);
        }

        let doubled = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return doubled;
        }
        let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
        doubled.mul_f64(factor).min(self.max_delay)
    }
}

/// Rate limits, 5xx replies, network failures, and timeouts are transient;
/// everything else fails the turn immediately.
pub fn is_retryable(error: &AgentError) -> bool {
    match error {
        AgentError::Http { status, .. } => *status == 429 || (500..=599).contains(status),
        AgentError::Network(_) | AgentError::Timeout => true,
        AgentError::Invocation(_) | AgentError::InvalidResponse(_) => false,
    }
}
