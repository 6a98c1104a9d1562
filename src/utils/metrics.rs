//! Per-task health reporting.
//!
//! Background tasks never surface errors as panics; they write what happened here and the
//! presentation layer reads a snapshot. Counters only grow for the lifetime of the engine so a
//! restart does not hide earlier failures. Recent-value buffers are bounded to `MAX_POINTS`.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

#[derive(Debug, Default, Clone)]
pub struct TaskHealth {
    /// Completed loop iterations (successful or not).
    pub ticks: u64,
    pub sensor_failures: u64,
    pub actuator_failures: u64,
    pub io_timeouts: u64,
    /// Steps that took longer than the task period.
    pub overruns: u64,
    /// Periods skipped to catch up after an overrun.
    pub skipped_ticks: u64,
    /// Window updates discarded because the presentation channel was full.
    pub dropped_updates: u64,
    /// Ticks without fresh history to compute a command from.
    pub idle_ticks: u64,
    pub faulted: bool,
    pub last_error: Option<String>,
    pub last_measurement: Option<f64>,
    pub last_command: Option<f64>,
    pub measurements: VecDeque<f64>,
    pub commands: VecDeque<f64>,
    pub step_us: VecDeque<u64>,
}

/// What a failure did to the task.
pub enum FailureKind {
    Sensor,
    Actuator,
    Timeout,
}

impl TaskHealth {
    pub fn record_failure(&mut self, kind: FailureKind, message: String) {
        match kind {
            FailureKind::Sensor => self.sensor_failures += 1,
            FailureKind::Actuator => self.actuator_failures += 1,
            FailureKind::Timeout => self.io_timeouts += 1,
        }
        self.last_error = Some(message);
    }

    pub fn record_fault(&mut self, message: String) {
        self.faulted = true;
        self.last_error = Some(message);
    }

    pub fn record_measurement(&mut self, value: f64) {
        self.last_measurement = Some(value);
        push_capped(&mut self.measurements, value);
    }

    pub fn record_command(&mut self, value: f64, step_us: u64) {
        self.last_command = Some(value);
        push_capped(&mut self.commands, value);
        push_capped_u64(&mut self.step_us, step_us);
    }

    /// A task that failed on its most recent attempts is still "healthy" unless it faulted;
    /// transient errors are expected on real hardware.
    pub fn is_healthy(&self) -> bool {
        !self.faulted
    }
}

pub type SharedHealth = Arc<Mutex<TaskHealth>>;

/// Locks a health record, recovering the data if a previous holder panicked.
pub fn lock_health(health: &SharedHealth) -> MutexGuard<'_, TaskHealth> {
    match health.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub const MAX_POINTS: usize = 1_000;

/// Appends value to a bounded buffer; removes oldest if at capacity (FIFO).
#[inline]
pub fn push_capped(buf: &mut VecDeque<f64>, val: f64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

#[inline]
pub fn push_capped_u64(buf: &mut VecDeque<u64>, val: u64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Computes min, max, mean over any sequence of floats.
pub fn calculate_stats<I>(data: I) -> Option<Stats>
where
    I: IntoIterator<Item = f64>,
{
    let mut count = 0usize;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for v in data {
        count += 1;
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    if count == 0 {
        return None;
    }
    Some(Stats {
        min,
        max,
        mean: sum / count as f64,
        count,
    })
}
