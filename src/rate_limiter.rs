//! API call throttling using a fixed-window token bucket
//!
//! All workers of a run share one limiter, naturally distributing the call
//! budget based on demand. The bucket holds `max_calls` tokens per window of
//! `interval`; a worker acquires one token per API call and waits for the
//! next window when the current one is spent. Token observation and
//! consumption happen under one lock, so no two workers can consume the same
//! token.

use crate::config::RateLimitConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

/// Call rate limiter shared across all workers of a run
///
/// Cloning is cheap and all clones share the same window state.
#[derive(Clone)]
pub struct RateLimiter {
    max_calls: u32,
    interval: Duration,
    window: Arc<Mutex<Window>>,
}

impl RateLimiter {
    /// Create a limiter allowing `config.max_calls` calls per `config.interval`
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_calls: config.max_calls,
            interval: config.interval,
            window: Arc::new(Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            })),
        }
    }

    /// Acquire permission for one API call
    ///
    /// Returns immediately while the current window has budget left,
    /// otherwise sleeps until the window rolls over. Fairness between
    /// waiters is left to the tokio mutex queue.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                if now.duration_since(window.started) >= self.interval {
                    window.started = now;
                    window.used = 0;
                }
                if window.used < self.max_calls {
                    window.used += 1;
                    return;
                }
                // Window is spent; sleep until it rolls over
                (window.started + self.interval).saturating_duration_since(now)
            };
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}
