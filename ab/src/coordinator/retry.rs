//! Retry and dead-letter policy
//!
//! Pure decisions over attempt counts; the Coordinator applies them.

use super::config::CoordinatorConfig;

/// What to do with a transiently failed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-schedule after the given delay
    Retry { delay_ms: i64 },
    /// Retries exhausted - move to the dead-letter queue
    DeadLetter,
}

/// Exponential backoff: `base * 2^attempt`, capped
pub fn backoff_ms(base_ms: i64, cap_ms: i64, attempt: u32) -> i64 {
    let factor = 1i64.checked_shl(attempt.min(31)).unwrap_or(i64::MAX);
    base_ms.saturating_mul(factor).min(cap_ms)
}

/// Decide retry vs dead-letter for a message that has now failed
/// `attempt_count` times
pub fn decide(config: &CoordinatorConfig, attempt_count: u32) -> RetryDecision {
    if attempt_count >= config.max_attempts {
        RetryDecision::DeadLetter
    } else {
        RetryDecision::Retry {
            delay_ms: backoff_ms(config.base_backoff_ms, config.max_backoff_ms, attempt_count),
        }
    }
}
