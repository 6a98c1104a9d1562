//! acquisition_task.rs
//! Periodic sampling loop: sensor → sample buffer → window update for the presentation layer.
//!
//! - One tick per poll interval; cancellation wakes the inter-tick wait immediately.
//! - Sensor failures and timeouts are logged and counted; the tick records nothing and the
//!   task keeps running.
//! - A sample the buffer rejects (time not increasing) is a fault: the instance stops and
//!   reports it through its health record.
//! - Window updates are pushed without blocking. When the presentation layer falls behind
//!   the oldest queued update is discarded so the newest one always gets through.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::acquisition::{
    sample_buffer::{Sample, SharedBuffer},
    sensor::TemperatureSensor,
    window::{WindowUpdate, WindowView},
};
use crate::runtime::{
    cancel::CancelToken, guarded_io::GuardedIo, schedule::Cadence, setpoint::Setpoint,
};
use crate::utils::{
    error::{EngineError, Result},
    metrics::{FailureKind, SharedHealth, lock_health},
};

/// Presentation-side endpoint of the window channel, as seen by the producer.
#[derive(Clone)]
pub struct WindowSink {
    pub tx: Sender<WindowUpdate>,
    /// Used only to evict the oldest update when the channel is full.
    pub evict: Receiver<WindowUpdate>,
}

pub struct AcquisitionTask {
    pub sensor: Arc<dyn TemperatureSensor>,
    pub buffer: SharedBuffer,
    pub setpoint: Setpoint,
    pub session_start: Instant,
    pub cadence: Cadence,
    pub horizon_secs: f64,
    pub io_timeout: Duration,
    pub sink: WindowSink,
    pub health: SharedHealth,
}

/// Why one tick did not produce a sample.
enum TickOutcome {
    Recorded,
    Skipped,
    Fault(EngineError),
}

impl AcquisitionTask {
    pub fn run(self, token: CancelToken) {
        info!(
            "[Acquisition] started: interval={:?} horizon={}s sensor={}",
            self.cadence.period(),
            self.horizon_secs,
            self.sensor.name()
        );

        let sensor = self.sensor.clone();
        let mut reader = match GuardedIo::spawn("sensor read", self.io_timeout, move |()| {
            sensor.read()
        }) {
            Ok(io) => io,
            Err(e) => {
                error!("[Acquisition] could not start sensor worker: {}", e);
                lock_health(&self.health).record_fault(e.to_string());
                return;
            }
        };

        let mut deadline = self.cadence.first_deadline(Instant::now());
        loop {
            if token.wait_until(deadline) {
                break;
            }

            let tick_at = Instant::now();
            self.cadence.mark(tick_at);

            match self.tick(&mut reader) {
                TickOutcome::Recorded | TickOutcome::Skipped => {}
                TickOutcome::Fault(e) => {
                    error!("[Acquisition] stopping after fault: {}", e);
                    lock_health(&self.health).record_fault(e.to_string());
                    break;
                }
            }

            let (next, skipped) = self.cadence.advance(deadline, Instant::now());
            if skipped > 0 {
                warn!("[Acquisition] tick overran, skipping {} period(s)", skipped);
                lock_health(&self.health).skipped_ticks += skipped;
            }
            deadline = next;
        }

        info!("[Acquisition] stopped.");
    }

    fn tick(&self, reader: &mut GuardedIo<(), Result<f64>>) -> TickOutcome {
        let reading = match reader.call(()) {
            Ok(Ok(value)) if value.is_finite() => value,
            Ok(Ok(value)) => {
                self.record_failure(
                    FailureKind::Sensor,
                    EngineError::Sensor(format!("non-finite reading {value}")),
                );
                return TickOutcome::Skipped;
            }
            Ok(Err(e)) => {
                self.record_failure(FailureKind::Sensor, e);
                return TickOutcome::Skipped;
            }
            Err(e) if e.is_transient() => {
                self.record_failure(FailureKind::Timeout, e);
                return TickOutcome::Skipped;
            }
            Err(e) => return TickOutcome::Fault(e),
        };

        let sample = Sample::new(
            self.session_start.elapsed().as_secs_f64(),
            self.setpoint.get(),
            reading,
        );
        if let Err(e) = self.buffer.append(sample) {
            return TickOutcome::Fault(e);
        }
        debug!(
            "[Acquisition] t={:.2}s setpoint={:.2} measurement={:.2}",
            sample.time, sample.setpoint, sample.measurement
        );

        {
            let mut h = lock_health(&self.health);
            h.ticks += 1;
            h.record_measurement(reading);
        }

        self.publish(sample);
        TickOutcome::Recorded
    }

    fn publish(&self, sample: Sample) {
        let view = self
            .buffer
            .with_read(|buffer| WindowView::from_buffer(buffer, self.horizon_secs));
        let update = WindowUpdate {
            time: sample.time,
            setpoint: sample.setpoint,
            measurement: sample.measurement,
            view,
        };

        match self.sink.tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                let _ = self.sink.evict.try_recv();
                lock_health(&self.health).dropped_updates += 1;
                if self.sink.tx.try_send(update).is_err() {
                    debug!("[Acquisition] window channel still full, update dropped");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("[Acquisition] no presentation layer attached");
            }
        }
    }

    fn record_failure(&self, kind: FailureKind, e: EngineError) {
        warn!("[Acquisition] {} (retrying next tick)", e);
        let mut h = lock_health(&self.health);
        h.ticks += 1;
        h.record_failure(kind, e.to_string());
    }
}
