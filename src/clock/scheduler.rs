//! Periodic tick timer seam

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::Result;

/// A fixed-period repeating host timer.
///
/// The timer only has to call back into the session; the session decides
/// how many ticks are due and ignores firings unless it is running.
pub trait TickScheduler {
    /// Start firing every `period`. Restarting an active timer replaces it.
    fn start(&mut self, period: Duration) -> Result<()>;

    /// Stop firing. Idempotent.
    fn cancel(&mut self);

    /// Whether the timer is currently armed.
    fn is_active(&self) -> bool;
}

#[derive(Debug, Default)]
struct ManualState {
    active: AtomicBool,
    period_nanos: AtomicU64,
    starts: AtomicU64,
}

/// Scheduler for hosts that drive the loop themselves (native soak loop,
/// tests).
///
/// It only records whether it is armed; the owner polls
/// [`is_active`](TickScheduler::is_active) and calls the session's timer
/// handler. Clones share state, so a clone kept outside the session observes
/// what the session did to it.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    state: Arc<ManualState>,
}

impl ManualScheduler {
    /// Create an idle scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Period of the last `start`, if started at least once.
    pub fn period(&self) -> Option<Duration> {
        match self.state.period_nanos.load(Ordering::Relaxed) {
            0 => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    /// Number of times the timer was started.
    pub fn starts(&self) -> u64 {
        self.state.starts.load(Ordering::Relaxed)
    }
}

impl TickScheduler for ManualScheduler {
    fn start(&mut self, period: Duration) -> Result<()> {
        let nanos = u64::try_from(period.as_nanos()).unwrap_or(u64::MAX).max(1);
        self.state.period_nanos.store(nanos, Ordering::Relaxed);
        self.state.starts.fetch_add(1, Ordering::Relaxed);
        self.state.active.store(true, Ordering::Release);
        Ok(())
    }

    fn cancel(&mut self) {
        self.state.active.store(false, Ordering::Release);
    }

    fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_observes_state() {
        let observer = ManualScheduler::new();
        let mut scheduler = observer.clone();
        assert!(!observer.is_active());
        assert_eq!(observer.period(), None);

        scheduler.start(Duration::from_millis(16)).unwrap();
        assert!(observer.is_active());
        assert_eq!(observer.period(), Some(Duration::from_millis(16)));

        scheduler.cancel();
        scheduler.cancel();
        assert!(!observer.is_active());
        assert_eq!(observer.starts(), 1);
    }
}
