//! Process-wide spacing of outbound geocoder calls.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Releases callers one at a time, at least `interval` apart.
///
/// The lock is held while sleeping, so waiters are released in the order they queued and
/// no two releases can fall inside the same interval.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_allowed: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next external call may be issued.
    pub async fn acquire(&self) {
        let mut next_allowed = self.next_allowed.lock().await;
        if let Some(at) = *next_allowed {
            sleep_until(at).await;
        }
        *next_allowed = Some(Instant::now() + self.interval);
    }
}
