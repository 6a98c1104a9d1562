//! Periodic release schedule shared by both background tasks.
//!
//! A `Cadence` outlives task instances: it remembers when the last tick ran, so an
//! instance started right after a stop continues the same rhythm instead of firing an
//! extra tick immediately or waiting a full period too long.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    last_tick: Arc<Mutex<Option<Instant>>>,
}

impl Cadence {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_tick: Arc::new(Mutex::new(None)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn last_tick(&self) -> Option<Instant> {
        *self.last_tick.lock()
    }

    /// Release time for the first tick of a new instance.
    pub fn first_deadline(&self, now: Instant) -> Instant {
        match self.last_tick() {
            Some(last) => (last + self.period).max(now),
            None => now,
        }
    }

    pub fn mark(&self, at: Instant) {
        *self.last_tick.lock() = Some(at);
    }

    /// Next release after `deadline`. If `now` is already past it, whole periods are
    /// skipped rather than run back to back; the number skipped is returned.
    pub fn advance(&self, deadline: Instant, now: Instant) -> (Instant, u64) {
        let next = deadline + self.period;
        if now <= next {
            return (next, 0);
        }
        let period_ns = self.period.as_nanos().max(1);
        let behind_ns = (now - next).as_nanos();
        let periods = behind_ns / period_ns + 1;
        let remaining_ns = period_ns - behind_ns % period_ns;
        let next = now + Duration::from_nanos(u64::try_from(remaining_ns).unwrap_or(u64::MAX));
        (next, u64::try_from(periods).unwrap_or(u64::MAX))
    }
}
