//! Redraw rate limiter - coalesces bursts of change requests into at most one
//! redraw per interval.
//!
//! Unlike a debounce, a steady stream of requests still redraws at the
//! maximum rate instead of waiting for the stream to stop:
//! 1. First request after an idle period is due immediately
//! 2. Requests while one is pending are merged into it
//! 3. The next redraw is never earlier than `interval` after the last one
//!
//! Callers observe stale visuals until the host calls `tick()`; that latency
//! is expected.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RedrawLimiter {
    interval: Duration,
    last_redraw: Option<Instant>,
    /// Pending redraw and the time it becomes due
    pending: Option<Instant>,
}

impl Default for RedrawLimiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(40))
    }
}

impl RedrawLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_redraw: None,
            pending: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ask for a redraw. Merged into an already pending one.
    pub fn request(&mut self, now: Instant) {
        if self.pending.is_some() {
            log::trace!("RedrawLimiter: request coalesced");
            return;
        }
        let due = match self.last_redraw {
            Some(last) => (last + self.interval).max(now),
            None => now,
        };
        self.pending = Some(due);
    }

    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            log::trace!("RedrawLimiter: pending redraw cancelled");
        }
    }

    /// True once when a pending redraw is due; clears the pending state.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(due) if now >= due => {
                self.pending = None;
                self.last_redraw = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
