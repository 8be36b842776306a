//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay to wait after attempt number `attempt` (1-based) failed.
///
/// Doubles from `base_ms`, is capped at `max_ms`, then jittered by up to
/// ±10% without ever exceeding the cap.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let nominal = base_ms.saturating_mul(factor).min(max_ms);

    let spread = nominal / 10;
    if spread == 0 {
        return Duration::from_millis(nominal);
    }
    let offset = rand::thread_rng().gen_range(0..=2 * spread);
    let jittered = (nominal - spread).saturating_add(offset);

    Duration::from_millis(jittered.min(max_ms))
}
