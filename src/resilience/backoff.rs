//! Exponential backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Delay to wait after failed attempt number `attempt` (1-based).
///
/// `base_ms × 2^(attempt−1)`, capped at `max_ms`. With `jitter`, up to 10%
/// of the capped delay is added.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, jitter: bool) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = if jitter { capped_delay / 10 } else { 0 };
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}
