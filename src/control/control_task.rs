//! control_task.rs
//! Periodic control loop: history window + setpoint → controller → actuator.
//!
//! - The controller is owned by the instance; a restart always gets a fresh one.
//! - Each step is timed. A step longer than the period counts as an overrun and the
//!   schedule skips the missed releases instead of running ticks back to back.
//! - Actuator calls go through a guarded worker so a hung driver cannot stall the loop.
//! - The controller only runs on fresh history. When the newest sample is older than
//!   `stale_after` (sensor failing, acquisition stopped) the tick is idle, and a heater that
//!   was being driven gets the safe command once.
//! - On exit the safe command is applied once (heater off).

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};

use crate::acquisition::sample_buffer::SharedBuffer;
use crate::control::{
    actuator::{Actuator, ActuatorCommand},
    controller::{ControlLaw, Controller},
};
use crate::runtime::{
    cancel::CancelToken, guarded_io::GuardedIo, schedule::Cadence, setpoint::Setpoint,
};
use crate::utils::{
    error::{EngineError, Result},
    metrics::{FailureKind, SharedHealth, lock_health},
};

pub struct ControlTask {
    pub controller: Controller,
    pub actuator: Arc<dyn Actuator>,
    pub buffer: SharedBuffer,
    pub setpoint: Setpoint,
    pub session_start: Instant,
    /// Age in seconds past which the newest sample no longer counts as a measurement.
    pub stale_after: f64,
    pub cadence: Cadence,
    pub history_secs: f64,
    pub io_timeout: Duration,
    pub safe_command: ActuatorCommand,
    pub health: SharedHealth,
}

type ActuatorIo = GuardedIo<ActuatorCommand, Result<()>>;

impl ControlTask {
    pub fn run(mut self, token: CancelToken) {
        info!(
            "[Control] started: controller={} interval={:?} actuator={}",
            self.controller.kind(),
            self.cadence.period(),
            self.actuator.name()
        );

        let actuator = self.actuator.clone();
        let mut io: ActuatorIo = match GuardedIo::spawn("actuator apply", self.io_timeout, move |cmd| {
            actuator.apply(cmd)
        }) {
            Ok(io) => io,
            Err(e) => {
                error!("[Control] could not start actuator worker: {}", e);
                lock_health(&self.health).record_fault(e.to_string());
                return;
            }
        };

        let mut deadline = self.cadence.first_deadline(Instant::now());
        let mut last_tick: Option<Instant> = None;
        let mut driving = false;
        loop {
            if token.wait_until(deadline) {
                break;
            }

            let tick_at = Instant::now();
            self.cadence.mark(tick_at);
            let dt = match last_tick {
                Some(prev) => tick_at.duration_since(prev).as_secs_f64(),
                None => self.cadence.period().as_secs_f64(),
            };
            last_tick = Some(tick_at);

            if let Err(e) = self.tick(&mut io, dt, &mut driving) {
                error!("[Control] stopping after fault: {}", e);
                lock_health(&self.health).record_fault(e.to_string());
                break;
            }

            let (next, skipped) = self.cadence.advance(deadline, Instant::now());
            if skipped > 0 {
                warn!("[Control] tick overran, skipping {} period(s)", skipped);
                lock_health(&self.health).skipped_ticks += skipped;
            }
            deadline = next;
        }

        match io.call(self.safe_command) {
            Ok(Ok(())) => info!("[Control] safe command {:?} applied", self.safe_command),
            Ok(Err(e)) => error!("[Control] safe command failed: {}", e),
            Err(e) => error!("[Control] safe command not confirmed: {}", e),
        }
        info!("[Control] stopped.");
    }

    /// Errors returned here end the instance; transient ones are recorded and swallowed.
    fn tick(&mut self, io: &mut ActuatorIo, dt: f64, driving: &mut bool) -> Result<()> {
        let now = self.session_start.elapsed().as_secs_f64();
        let history = self.buffer.recent(self.history_secs);
        if let Some(latest) = history.last() {
            let age = now - latest.time;
            if age > self.stale_after {
                {
                    let mut h = lock_health(&self.health);
                    h.ticks += 1;
                    h.idle_ticks += 1;
                }
                if *driving {
                    warn!("[Control] newest sample is {:.1}s old, holding the safe command", age);
                    *driving = !self.apply(io, self.safe_command, dt, 0)?;
                } else {
                    debug!("[Control] newest sample is {:.1}s old, nothing applied", age);
                }
                return Ok(());
            }
        }
        let setpoint = self.setpoint.get();

        let started = Instant::now();
        let result = self.controller.step(&history, setpoint, dt);
        let elapsed = started.elapsed();
        let step_us = elapsed.as_micros() as u64;

        {
            let mut h = lock_health(&self.health);
            h.ticks += 1;
            if elapsed > self.cadence.period() {
                h.overruns += 1;
                warn!("[Control] controller step took {} us, longer than the period", step_us);
            }
        }

        let command = match result {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!("[Control] no history yet, nothing applied");
                lock_health(&self.health).idle_ticks += 1;
                return Ok(());
            }
            Err(e) => {
                warn!("[Control] controller step failed: {}", e);
                lock_health(&self.health).last_error = Some(e.to_string());
                return Ok(());
            }
        };

        debug!("[Control] setpoint={:.2} command={:?} step={}us", setpoint, command, step_us);
        if self.apply(io, command, dt, step_us)? {
            *driving = true;
        }
        Ok(())
    }

    /// Sends `command` to the actuator. `Ok(true)` when it was confirmed; only a lost
    /// worker is returned as an error.
    fn apply(
        &self,
        io: &mut ActuatorIo,
        command: ActuatorCommand,
        dt: f64,
        step_us: u64,
    ) -> Result<bool> {
        match io.call(command) {
            Ok(Ok(())) => {
                debug!("[Control] applied {:?} dt={:.3}s", command, dt);
                lock_health(&self.health).record_command(command.as_f64(), step_us);
                Ok(true)
            }
            Ok(Err(e)) => {
                self.record_failure(FailureKind::Actuator, e);
                Ok(false)
            }
            Err(e) if e.is_transient() => {
                self.record_failure(FailureKind::Timeout, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn record_failure(&self, kind: FailureKind, e: EngineError) {
        warn!("[Control] {} (retrying next tick)", e);
        lock_health(&self.health).record_failure(kind, e.to_string());
    }
}
