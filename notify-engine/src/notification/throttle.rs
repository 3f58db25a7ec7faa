//! Minimum-interval rate limiter for the immediate lane.
//!
//! Not a token bucket: there is no burst capacity, so dispatch starts are
//! spaced at least `interval` apart.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, sleep_until};

#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_dispatch: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next dispatch slot and claim it.
    ///
    /// The slot is reserved under the lock before sleeping, so concurrent
    /// callers are serialized onto distinct slots.
    pub async fn acquire(&self) {
        let slot = {
            let mut last = self.last_dispatch.lock();
            let now = Instant::now();
            let slot = match *last {
                Some(prev) => (prev + self.interval).max(now),
                None => now,
            };
            *last = Some(slot);
            slot
        };

        if slot > Instant::now() {
            sleep_until(slot).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_per_second() -> Throttle {
        Throttle::new(Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let throttle = ten_per_second();
        let start = Instant::now();
        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_smoothed_to_rate() {
        let throttle = ten_per_second();
        let start = Instant::now();
        for _ in 0..25 {
            throttle.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(2400));
        assert!(start.elapsed() < Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_period_does_not_accumulate_burst() {
        let throttle = ten_per_second();
        throttle.acquire().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let start = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }
}
