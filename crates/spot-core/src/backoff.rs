//! Exponential backoff with jitter for `TransientUpstream` retries.
//!
//! Hand-rolled rather than pulled in from a crate, matching the retry
//! loops written by hand around cloud SDK calls elsewhere in this crate.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    attempt: u32,
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            attempt: 0,
            base,
            max,
        }
    }

    /// Heartbeat retries: capped at 60s.
    pub fn heartbeat() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(60))
    }

    /// Next delay, advancing the internal attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.base.as_millis().saturating_mul(1u128 << self.attempt.min(16));
        let capped = exp.min(self.max.as_millis());
        self.attempt = self.attempt.saturating_add(1);
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1)) as u64;
        Duration::from_millis(jittered).max(Duration::from_millis(1))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_within_max() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        for _ in 0..20 {
            let d = b.next_delay();
            assert!(d <= Duration::from_secs(1));
        }
    }
}
