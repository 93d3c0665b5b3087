//! Cooperative rate-limit gate.
//!
//! Combines a concurrency cap (a [`tokio::sync::Semaphore`]) with a
//! sliding 60-second window over a requests-per-minute cap. Acquiring
//! the gate may suspend the caller; it never spins or returns a
//! rejection — callers simply wait their turn, per the design's
//! "acquiring the gate may block, never spin" rule.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::models::RateLimitConfig;

pub struct RateGate {
    semaphore: Arc<Semaphore>,
    window: Mutex<VecDeque<Instant>>,
    requests_per_minute: usize,
}

impl RateGate {
    pub fn new(config: &RateLimitConfig) -> Self {
        RateGate {
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1) as usize)),
            window: Mutex::new(VecDeque::new()),
            requests_per_minute: config.requests_per_minute.max(1) as usize,
        }
    }

    /// Waits until both the sliding window and the concurrency cap
    /// admit one more call, then returns a permit that releases the
    /// concurrency slot on drop.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                while let Some(&front) = window.front() {
                    if now.duration_since(front) >= Duration::from_secs(60) {
                        window.pop_front();
                    } else {
                        break;
                    }
                }
                if window.len() < self.requests_per_minute {
                    window.push_back(now);
                    None
                } else {
                    Some(Duration::from_secs(60) - now.duration_since(window[0]))
                }
            };

            match wait {
                None => break,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }

        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("rate gate semaphore is never closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_the_window_limit_without_blocking() {
        let gate = RateGate::new(&RateLimitConfig {
            requests_per_minute: 2,
            concurrency: 2,
        });
        let start = Instant::now();
        let _a = gate.acquire().await;
        let _b = gate.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
