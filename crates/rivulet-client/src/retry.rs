//! Reconnection delay policy.

use rand::Rng;

/// Configuration for reconnecting after a dropped or rejected connection.
///
/// With the defaults every reconnection waits exactly `initial_delay_ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Base delay in milliseconds before a reconnection attempt.
    pub initial_delay_ms: u64,
    /// Upper bound for the delay once backoff is applied.
    pub max_delay_ms: u64,
    /// Multiplier applied per consecutive failure (1.0 = fixed delay).
    pub backoff_factor: f64,
    /// Apply ±25% jitter to each delay.
    pub jitter: bool,
    /// Give up after this many consecutive failures (`None` = never).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_factor: 1.0,
            jitter: false,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// A fixed-delay config.
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            initial_delay_ms: delay_ms,
            ..Self::default()
        }
    }

    /// Returns `true` once `failures` consecutive failures exceed `max_attempts`.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures > max)
    }
}

/// Calculate the delay in milliseconds before reconnection attempt `attempt`
/// (zero-based count of consecutive failures before this one).
///
/// A server-supplied `retry:` value replaces `initial_delay_ms` as the base.
/// The base itself is never cut down by `max_delay_ms`; backoff growth is.
pub fn calculate_delay(config: &ReconnectConfig, attempt: u32, server_retry_ms: Option<u64>) -> u64 {
    let base = server_retry_ms.unwrap_or(config.initial_delay_ms);
    let ceiling = config.max_delay_ms.max(base) as f64;

    let scaled = base as f64 * config.backoff_factor.powi(attempt.min(i32::MAX as u32) as i32);
    let clamped = scaled.min(ceiling);

    if !config.jitter {
        return clamped as u64;
    }

    // Apply ±25% jitter
    let jitter_factor = rand::rng().random_range(0.75..=1.25);
    ((clamped * jitter_factor) as u64).min(ceiling as u64)
}
