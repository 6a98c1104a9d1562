//! sample_buffer.rs
//! Append-only, growable history of time-stamped samples.
//!
//! - Capacity starts at a configured size and doubles when full; it never shrinks.
//! - Times are strictly increasing; an out-of-order sample is rejected, not stored.
//! - `SharedBuffer` wraps the buffer for one writer (acquisition) and many readers
//!   (control task, presentation). Growth happens under the write lock and readers get
//!   owned copies, so nobody observes a buffer halfway through reallocation.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::utils::error::{EngineError, Result};

/// One `(time, setpoint, measurement)` observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Seconds since session start.
    pub time: f64,
    /// Target temperature at the moment of sampling, °C.
    pub setpoint: f64,
    /// Measured temperature, °C.
    pub measurement: f64,
}

impl Sample {
    pub fn new(time: f64, setpoint: f64, measurement: f64) -> Self {
        Self {
            time,
            setpoint,
            measurement,
        }
    }
}

#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(initial_capacity: usize) -> Result<Self> {
        if initial_capacity == 0 {
            return Err(EngineError::Config(
                "sample buffer needs a positive initial capacity".into(),
            ));
        }
        Ok(Self {
            samples: Vec::with_capacity(initial_capacity),
            capacity: initial_capacity,
        })
    }

    /// Stores `sample`, doubling the capacity first when the buffer is full.
    pub fn append(&mut self, sample: Sample) -> Result<()> {
        if !sample.time.is_finite() {
            return Err(EngineError::Invariant(format!(
                "sample time must be finite (got {})",
                sample.time
            )));
        }
        if let Some(last) = self.samples.last() {
            if sample.time <= last.time {
                return Err(EngineError::Invariant(format!(
                    "sample time {} does not follow previous time {}",
                    sample.time, last.time
                )));
            }
        }

        if self.samples.len() == self.capacity {
            let grown = self.capacity * 2;
            self.samples.reserve_exact(grown - self.samples.len());
            self.capacity = grown;
        }
        self.samples.push(sample);

        debug_assert!(self.samples.len() <= self.capacity);
        Ok(())
    }

    /// All samples with `time > now - horizon`, oldest first.
    ///
    /// `now` is the time of the most recent sample; callers normally pass
    /// `latest().time`, see [`SampleBuffer::recent`].
    pub fn window(&self, now: f64, horizon: f64) -> &[Sample] {
        let cutoff = now - horizon;
        // Times are sorted, so the window is a suffix.
        let start = self.samples.partition_point(|s| s.time <= cutoff);
        &self.samples[start..]
    }

    /// Window anchored at the latest sample; empty when nothing was recorded yet.
    pub fn recent(&self, horizon: f64) -> &[Sample] {
        match self.latest() {
            Some(last) => self.window(last.time, horizon),
            None => &[],
        }
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Session history shared between the acquisition writer and its readers.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    inner: Arc<RwLock<SampleBuffer>>,
}

impl SharedBuffer {
    pub fn new(initial_capacity: usize) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(RwLock::new(SampleBuffer::new(initial_capacity)?)),
        })
    }

    pub fn append(&self, sample: Sample) -> Result<()> {
        self.inner.write().append(sample)
    }

    /// Owned copy of the trailing window anchored at the latest sample.
    pub fn recent(&self, horizon: f64) -> Vec<Sample> {
        self.inner.read().recent(horizon).to_vec()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.inner.read().latest().copied()
    }

    /// Owned copy of the whole session history.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.inner.read().samples().to_vec()
    }

    /// `(count, capacity)` read under a single lock.
    pub fn occupancy(&self) -> (usize, usize) {
        let buffer = self.inner.read();
        (buffer.len(), buffer.capacity())
    }

    /// Runs `f` against the buffer under the read lock.
    pub fn with_read<R>(&self, f: impl FnOnce(&SampleBuffer) -> R) -> R {
        f(&self.inner.read())
    }
}
