//! Fixed-window request pacing for NCBI E-utilities.
//!
//! NCBI allows 3 requests per second without an API key. The limiter counts
//! acquisitions in a window that opens at the first acquisition after a
//! reset; once the window is full, the next caller sleeps out the remainder
//! and opens a fresh window. Bursts above the nominal rate are possible at
//! window edges.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

pub const DEFAULT_REQUESTS_PER_WINDOW: u32 = 3;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Window {
    start: Option<Instant>,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_WINDOW, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    /// `max_per_window` of zero is treated as one.
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window,
            state: Mutex::new(Window::default()),
        }
    }

    /// Wait until another request may be issued, then claim the slot.
    ///
    /// The window lock is held across the sleep so concurrent callers are
    /// admitted one at a time.
    pub async fn acquire(&self) {
        let mut w = self.state.lock().await;

        if w.count >= self.max_per_window {
            if let Some(start) = w.start {
                let elapsed = start.elapsed();
                if elapsed < self.window {
                    let wait = self.window - elapsed;
                    debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, pausing");
                    sleep(wait).await;
                }
            }
            w.count = 0;
            w.start = None;
        }

        if w.start.is_none() {
            w.start = Some(Instant::now());
        }
        w.count += 1;
    }
}
