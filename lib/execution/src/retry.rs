//! Retry delay computation.

use meridian_graph::BackoffStrategy;
use rand::Rng;
use std::time::Duration;

/// Computes the delay to wait before `attempt` (1-indexed) given a node's
/// retry configuration. `jitter`, when set, adds up to 1s of uniform random
/// delay on top of the computed base.
#[must_use]
pub fn compute_delay(backoff: BackoffStrategy, attempt: u32, delay_ms: u64, jitter: bool) -> Duration {
    let base_ms = match backoff {
        BackoffStrategy::Fixed => delay_ms,
        BackoffStrategy::Linear => delay_ms.saturating_mul(u64::from(attempt)),
        BackoffStrategy::Exponential => delay_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(32)),
    };

    let jitter_ms = if jitter {
        rand::thread_rng().gen_range(0..=1_000)
    } else {
        0
    };

    Duration::from_millis(base_ms + jitter_ms)
}
