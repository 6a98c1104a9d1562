//! controller.rs
//! Feedback-control strategies selectable at runtime.
//!
//! Every variant maps `(history, setpoint, dt)` to an actuator command. A new instance is
//! built on every control-task start, so internal state (the PI integrator) never carries
//! over from a previous run. `step` does no I/O and reads no clock; identical inputs on
//! identically-constructed controllers produce identical commands.
//!
//! Gains and plant models come from configuration only. Building a variant whose table is
//! missing is a configuration error.

use std::{fmt, str::FromStr};

use crate::acquisition::sample_buffer::Sample;
use crate::control::{
    actuator::ActuatorCommand, lqr::LqrController, mpc::MpcController, pi::PiController,
};
use crate::utils::{
    config::ControllerConfig,
    error::{EngineError, Result},
};

/// The single capability every control law offers.
pub trait ControlLaw {
    /// Computes the next command. `None` means there is not enough history to act on.
    fn step(&mut self, history: &[Sample], setpoint: f64, dt: f64)
    -> Result<Option<ActuatorCommand>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControllerKind {
    #[default]
    Pi,
    Lqr,
    Mpc,
}

impl ControllerKind {
    pub const ALL: [ControllerKind; 3] = [ControllerKind::Pi, ControllerKind::Lqr, ControllerKind::Mpc];

    pub fn name(&self) -> &'static str {
        match self {
            ControllerKind::Pi => "PI",
            ControllerKind::Lqr => "LQR",
            ControllerKind::Mpc => "MPC",
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControllerKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PI" => Ok(ControllerKind::Pi),
            "LQR" => Ok(ControllerKind::Lqr),
            "MPC" => Ok(ControllerKind::Mpc),
            other => Err(EngineError::Config(format!(
                "unknown controller '{other}' (expected PI, LQR or MPC)"
            ))),
        }
    }
}

pub enum Controller {
    Pi(PiController),
    Lqr(LqrController),
    Mpc(MpcController),
}

impl Controller {
    /// Builds a fresh instance of `kind` from its configuration table.
    pub fn build(kind: ControllerKind, config: &ControllerConfig) -> Result<Self> {
        let limits = OutputLimits::new(config.output_min, config.output_max)?;
        let missing = |table: &str| {
            EngineError::Config(format!(
                "{kind} controller selected but [controller.{table}] is not configured"
            ))
        };
        match kind {
            ControllerKind::Pi => {
                let gains = config.pi.ok_or_else(|| missing("pi"))?;
                Ok(Controller::Pi(PiController::new(gains, limits)?))
            }
            ControllerKind::Lqr => {
                let gains = config.lqr.ok_or_else(|| missing("lqr"))?;
                Ok(Controller::Lqr(LqrController::new(gains, limits)?))
            }
            ControllerKind::Mpc => {
                let model = config.mpc.ok_or_else(|| missing("mpc"))?;
                Ok(Controller::Mpc(MpcController::new(model, limits)?))
            }
        }
    }

    pub fn kind(&self) -> ControllerKind {
        match self {
            Controller::Pi(_) => ControllerKind::Pi,
            Controller::Lqr(_) => ControllerKind::Lqr,
            Controller::Mpc(_) => ControllerKind::Mpc,
        }
    }
}

impl ControlLaw for Controller {
    fn step(
        &mut self,
        history: &[Sample],
        setpoint: f64,
        dt: f64,
    ) -> Result<Option<ActuatorCommand>> {
        match self {
            Controller::Pi(c) => c.step(history, setpoint, dt),
            Controller::Lqr(c) => c.step(history, setpoint, dt),
            Controller::Mpc(c) => c.step(history, setpoint, dt),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputLimits {
    pub min: f64,
    pub max: f64,
}

impl OutputLimits {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !(min.is_finite() && max.is_finite()) || min >= max {
            return Err(EngineError::Config(format!(
                "output limits must satisfy min < max (got {min} .. {max})"
            )));
        }
        Ok(Self { min, max })
    }

    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

pub(crate) fn require_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::Config(format!("{name} must be finite (got {value})")))
    }
}
