//! Playback clock driving the animation cursor.
//!
//! There is no background thread: the host loop calls `tick(now)` and the
//! clock answers with the step the cursor should show, at most once per
//! timer interval.
//!
//! # Timing Model
//!
//! Wall-clock based from the start of the run:
//! `step = start_step + round(elapsed_secs * rate)`. A stalled host loop
//! therefore skips steps instead of slowing playback down.

use std::time::{Duration, Instant};

use log::{debug, trace};

#[derive(Clone, Copy, Debug)]
struct Run {
    started: Instant,
    start_step: i64,
    last_tick: Instant,
}

#[derive(Clone, Debug)]
pub struct Playback {
    /// Cursor steps per second of wall time
    rate: f64,
    /// Timer period between ticks
    interval: Duration,
    run: Option<Run>,
}

impl Default for Playback {
    fn default() -> Self {
        Self::new(30.0, Duration::from_millis(33))
    }
}

impl Playback {
    pub fn new(rate: f64, interval: Duration) -> Self {
        Self {
            rate,
            interval,
            run: None,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Start a run at `step`. Returns false if a run is already active.
    pub fn start(&mut self, now: Instant, step: i64) -> bool {
        if self.run.is_some() {
            trace!("playback already running, start ignored");
            return false;
        }
        self.run = Some(Run {
            started: now,
            start_step: step,
            last_tick: now,
        });
        debug!("playback started at step {} ({} steps/s)", step, self.rate);
        true
    }

    /// Tear down the active run. Returns true if one was running.
    pub fn stop(&mut self) -> bool {
        let was = self.run.take().is_some();
        if was {
            debug!("playback stopped");
        }
        was
    }

    /// Step due at `now`, or None if not running or the interval has not
    /// elapsed since the previous tick.
    pub fn tick(&mut self, now: Instant) -> Option<i64> {
        let run = self.run.as_mut()?;
        if now.saturating_duration_since(run.last_tick) < self.interval {
            return None;
        }
        run.last_tick = now;
        let elapsed = now.saturating_duration_since(run.started).as_secs_f64();
        Some(run.start_step + (elapsed * self.rate).round() as i64)
    }
}
