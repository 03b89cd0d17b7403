//! Tick pacing against a monotonic host clock
//!
//! Host timers drift and jitter: a 16.7 ms interval may fire after 15 ms, or
//! after 40 ms when the main thread was busy. The pacer keeps an anchored
//! schedule of tick deadlines and, on every timer firing, reports how many
//! ticks are due. Small backlogs are caught up; large ones (a throttled
//! background tab) are dropped by re-anchoring the schedule at the current
//! time.

use std::time::Duration;
use tracing::debug;

use super::DEFAULT_FRAME_RATE_HZ;

/// Most ticks run for one timer firing before the schedule is re-anchored.
pub const MAX_CATCH_UP_TICKS: u32 = 4;

/// Accepted tick rates in Hz
pub const FRAME_RATE_RANGE: std::ops::RangeInclusive<f64> = 1.0..=240.0;

/// Deadline tracker for a fixed tick period.
#[derive(Debug, Clone)]
pub struct FramePacer {
    /// Tick period
    period: Duration,
    /// Deadline of the next tick; `None` until the first firing
    next_due: Option<Duration>,
    /// Ticks granted since creation
    granted: u64,
    /// Times the backlog was dropped
    resyncs: u64,
}

impl FramePacer {
    /// Create a pacer for `period`. A zero period is treated as 1 ns.
    pub fn new(period: Duration) -> Self {
        FramePacer {
            period: period.max(Duration::from_nanos(1)),
            next_due: None,
            granted: 0,
            resyncs: 0,
        }
    }

    /// Create a pacer ticking `hz` times per second.
    ///
    /// `hz` is clamped to [`FRAME_RATE_RANGE`]; NaN falls back to
    /// [`DEFAULT_FRAME_RATE_HZ`].
    pub fn from_rate(hz: f64) -> Self {
        let hz = if hz.is_nan() {
            DEFAULT_FRAME_RATE_HZ
        } else {
            hz.clamp(*FRAME_RATE_RANGE.start(), *FRAME_RATE_RANGE.end())
        };
        Self::new(Duration::from_secs_f64(1.0 / hz))
    }

    /// Number of ticks to run at host time `now`.
    ///
    /// The first call always grants one tick and anchors the schedule.
    pub fn due(&mut self, now: Duration) -> u32 {
        let next = match self.next_due {
            Some(next) => next,
            None => return self.anchor(now),
        };
        if now < next {
            return 0;
        }

        let behind = (now - next).as_nanos() / self.period.as_nanos() + 1;
        if behind > u128::from(MAX_CATCH_UP_TICKS) {
            self.resyncs += 1;
            debug!(
                behind = behind as u64,
                resyncs = self.resyncs,
                "Tick backlog dropped, re-anchoring"
            );
            return self.anchor(now);
        }

        let ticks = behind as u32;
        self.next_due = Some(next + self.period * ticks);
        self.granted += u64::from(ticks);
        ticks
    }

    fn anchor(&mut self, now: Duration) -> u32 {
        self.next_due = Some(now + self.period);
        self.granted += 1;
        1
    }

    /// Forget the schedule; the next call to [`due`](Self::due) re-anchors.
    pub fn reset(&mut self) {
        self.next_due = None;
    }

    /// Tick period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks granted since creation
    pub fn granted(&self) -> u64 {
        self.granted
    }

    /// Times a backlog was dropped
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }
}
