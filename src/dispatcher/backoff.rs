//! Poll backoff
//!
//! After `k` consecutive empty or failed polls the dispatcher sleeps
//! `relief * 2^k`. There is no cap; the arithmetic saturates at
//! `Duration::MAX` instead of overflowing. One successful poll resets `k`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    relief: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(relief: Duration) -> Self {
        Self { relief, failures: 0 }
    }

    /// Count one more failure and return the delay to apply
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        scale(self.relief, self.failures)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// `relief * 2^k`, saturating at `Duration::MAX`
fn scale(relief: Duration, k: u32) -> Duration {
    if relief.is_zero() {
        return Duration::ZERO;
    }
    if k >= 64 {
        return Duration::MAX;
    }

    let nanos = relief.as_nanos().saturating_mul(1u128 << k);
    match u64::try_from(nanos / 1_000_000_000) {
        Ok(secs) => Duration::new(secs, (nanos % 1_000_000_000) as u32),
        Err(_) => Duration::MAX,
    }
}
