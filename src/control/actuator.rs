//! actuator.rs
//! Actuator capability and the command vocabulary shared by controllers and manual overrides.
//!
//! - `Level` carries a continuous output bounded by the controller output limits (heater duty).
//! - `Switch` carries an on/off order (the pump relay on a single GPIO pin).
//! - `RelayActuator` adapts a switch-only device to continuous controller output.

use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

use crate::utils::error::Result;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    Level(f64),
    Switch(bool),
}

impl ActuatorCommand {
    /// Numeric form for logging and health history (`Switch` maps to 0/1).
    pub fn as_f64(&self) -> f64 {
        match *self {
            ActuatorCommand::Level(v) => v,
            ActuatorCommand::Switch(on) => {
                if on {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

pub trait Actuator: Send + Sync {
    fn apply(&self, command: ActuatorCommand) -> Result<()>;

    fn name(&self) -> &str {
        "actuator"
    }
}

impl<A: Actuator + ?Sized> Actuator for Arc<A> {
    fn apply(&self, command: ActuatorCommand) -> Result<()> {
        (**self).apply(command)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Drives an on/off device from continuous output: on at or above `threshold`.
///
/// The last state is remembered so the relay is only toggled on a change.
pub struct RelayActuator<A> {
    inner: A,
    threshold: f64,
    state: Mutex<Option<bool>>,
}

impl<A: Actuator> RelayActuator<A> {
    pub fn new(inner: A, threshold: f64) -> Self {
        Self {
            inner,
            threshold,
            state: Mutex::new(None),
        }
    }

    pub fn is_on(&self) -> Option<bool> {
        *self.state.lock()
    }
}

impl<A: Actuator> Actuator for RelayActuator<A> {
    fn apply(&self, command: ActuatorCommand) -> Result<()> {
        let on = match command {
            ActuatorCommand::Level(v) => v >= self.threshold,
            ActuatorCommand::Switch(on) => on,
        };
        let mut state = self.state.lock();
        if *state == Some(on) {
            return Ok(());
        }
        self.inner.apply(ActuatorCommand::Switch(on))?;
        info!("[Relay] {} {}", self.inner.name(), if on { "on" } else { "off" });
        *state = Some(on);
        Ok(())
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ActuatorCommand>>);

    impl Actuator for Recorder {
        fn apply(&self, command: ActuatorCommand) -> Result<()> {
            self.0.lock().push(command);
            Ok(())
        }
    }

    #[test]
    fn relay_only_toggles_on_change() {
        let recorder = Arc::new(Recorder::default());
        let relay = RelayActuator::new(recorder.clone(), 50.0);

        relay.apply(ActuatorCommand::Level(80.0)).unwrap();
        relay.apply(ActuatorCommand::Level(60.0)).unwrap();
        relay.apply(ActuatorCommand::Level(10.0)).unwrap();
        relay.apply(ActuatorCommand::Switch(false)).unwrap();

        assert_eq!(
            *recorder.0.lock(),
            vec![ActuatorCommand::Switch(true), ActuatorCommand::Switch(false)]
        );
        assert_eq!(relay.is_on(), Some(false));
    }
}
