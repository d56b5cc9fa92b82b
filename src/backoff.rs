//! Randomized exponential backoff for the Proposer's retry loop
//! (spec.md §4.2 "Retry policy", §9 "Retry wrapper"), plus the
//! uniform-random sleep helper primitive spec.md §2 lists alongside
//! ProposalId arithmetic and peer-set enumeration.

use std::time::Duration;

use rand::Rng;

/// Sleeps for a uniformly random duration in `[min, max)`. Used directly
/// by the Leader's empty-result retry (spec.md §4.3) and as the building
/// block for [`ExponentialBackoff`].
pub async fn sleep_uniform(min: Duration, max: Duration) {
    let millis = if max > min {
        rand::thread_rng().gen_range(min.as_millis() as u64..max.as_millis() as u64)
    } else {
        min.as_millis() as u64
    };
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

/// Doubles its wait time (within random jitter) on every call, capped so
/// that the sequence of waits it produces never pushes the caller past an
/// overall retry budget on its own; the caller is still responsible for
/// checking the elapsed budget between attempts.
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        ExponentialBackoff {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Sleeps for this attempt's randomized backoff, then advances to the
    /// next attempt.
    pub async fn wait(&mut self) {
        let factor = 1u64 << self.attempt.min(16);
        let upper = self
            .base
            .checked_mul(factor as u32)
            .unwrap_or(self.cap)
            .min(self.cap);
        self.attempt += 1;
        sleep_uniform(self.base, upper.max(self.base + Duration::from_millis(1))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_uniform_respects_bounds() {
        let start = tokio::time::Instant::now();
        sleep_uniform(Duration::from_millis(1), Duration::from_millis(5)).await;
        assert!(start.elapsed() >= Duration::from_millis(1));
    }

    #[tokio::test]
    async fn backoff_attempts_increase() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(50));
        for _ in 0..5 {
            backoff.wait().await;
        }
        assert_eq!(backoff.attempt, 5);
    }
}
