#![allow(dead_code)]

use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    thread,
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

use brewpi::{
    acquisition::sensor::TemperatureSensor,
    control::actuator::{Actuator, ActuatorCommand},
    utils::{
        config::{EngineConfig, LqrGains},
        error::{EngineError, Result},
    },
};

/// Millisecond-scale timing so lifecycle tests finish quickly.
pub fn fast_config(period_ms: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    let period = period_ms as f64 / 1000.0;
    config.engine.acquisition_interval_secs = period;
    config.engine.control_interval_secs = period;
    config.engine.horizon_secs = 1.0;
    config.engine.control_history_secs = 1.0;
    config.engine.io_timeout_secs = 0.2;
    config
}

/// Proportional-only state feedback: `u = setpoint - T`.
pub fn unit_lqr(config: &mut EngineConfig) {
    config.controller.lqr = Some(LqrGains { k: [1.0, 0.0] });
}

pub struct MockSensor {
    value: Mutex<f64>,
    failing: AtomicBool,
    gate: Mutex<Option<Receiver<()>>>,
    delay: Mutex<Duration>,
    reads: AtomicU64,
}

impl MockSensor {
    pub fn new(value: f64) -> Self {
        Self {
            value: Mutex::new(value),
            failing: AtomicBool::new(false),
            gate: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            reads: AtomicU64::new(0),
        }
    }

    pub fn set_value(&self, value: f64) {
        *self.value.lock() = value;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Every read blocks until the returned sender is dropped.
    pub fn hang(&self) -> Sender<()> {
        let (tx, rx) = bounded(0);
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl TemperatureSensor for MockSensor {
    fn read(&self) -> Result<f64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::Sensor("probe disconnected".into()));
        }
        Ok(*self.value.lock())
    }

    fn name(&self) -> &str {
        "mock sensor"
    }
}

#[derive(Default)]
pub struct RecordingActuator {
    commands: Mutex<Vec<ActuatorCommand>>,
    delay: Mutex<Duration>,
}

impl RecordingActuator {
    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.commands.lock().clone()
    }

    /// Every apply sleeps this long before the command is recorded.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

impl Actuator for RecordingActuator {
    fn apply(&self, command: ActuatorCommand) -> Result<()> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.commands.lock().push(command);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording actuator"
    }
}

/// Polls `check` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}
