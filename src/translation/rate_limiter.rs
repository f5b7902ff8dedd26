/*!
 * Sliding-window rate limiting.
 *
 * Caps the number of outbound requests inside a trailing time window, which is
 * how vendor quotas such as "60 requests per minute" are expressed.
 */

use log::trace;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use super::concurrency::ServiceProfile;

/// Default upper bound for one sleep while waiting for a slot
const DEFAULT_MAX_SLEEP_STEP: Duration = Duration::from_millis(250);

/// Snapshot of the limiter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Permits used in the current window
    pub current: usize,
    /// Permits allowed per window
    pub max: usize,
    /// Time until the oldest permit leaves the window, in milliseconds
    pub reset_in_ms: u64,
}

/// Sliding-window rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    max_sleep_step: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `window`
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            max_sleep_step: DEFAULT_MAX_SLEEP_STEP,
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests.max(1))),
        }
    }

    /// Create the limiter matching a service quota, if the service has one
    pub fn from_profile(profile: &ServiceProfile) -> Option<Self> {
        profile
            .requests_per_window
            .map(|max| Self::new(max, Duration::from_millis(profile.window_ms)))
    }

    /// Bound each individual sleep while waiting
    pub fn with_max_sleep_step(mut self, step: Duration) -> Self {
        self.max_sleep_step = step.max(Duration::from_millis(1));
        self
    }

    /// Wait until a permit is available, then take it
    pub async fn wait_for_slot(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock();
                let now = Instant::now();
                self.prune(&mut timestamps, now);

                if timestamps.len() < self.max_requests {
                    timestamps.push_back(now);
                    return;
                }

                self.time_until_free(&timestamps, now)
            };

            trace!("Rate limit reached, waiting {:?} for a slot", wait);
            sleep(wait.clamp(Duration::from_millis(1), self.max_sleep_step)).await;
        }
    }

    /// Take a permit without waiting
    pub fn try_acquire(&self) -> bool {
        let mut timestamps = self.timestamps.lock();
        let now = Instant::now();
        self.prune(&mut timestamps, now);

        if timestamps.len() < self.max_requests {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Get the current usage of the window
    pub fn status(&self) -> RateLimitStatus {
        let mut timestamps = self.timestamps.lock();
        let now = Instant::now();
        self.prune(&mut timestamps, now);

        RateLimitStatus {
            current: timestamps.len(),
            max: self.max_requests,
            reset_in_ms: self.time_until_free(&timestamps, now).as_millis() as u64,
        }
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn time_until_free(&self, timestamps: &VecDeque<Instant>, now: Instant) -> Duration {
        timestamps
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}
