//! State-feedback law `u = -K (x - r)` on the two-state vessel model.
//!
//! State `x = [T, dT/dt]` comes from the last two samples of the history, reference
//! `r = [setpoint, 0]`. `K` is solved offline against the commissioned plant model and
//! loaded from configuration; nothing here solves a Riccati equation at runtime.

use crate::acquisition::sample_buffer::Sample;
use crate::control::{
    actuator::ActuatorCommand,
    controller::{ControlLaw, OutputLimits, require_finite},
};
use crate::utils::{config::LqrGains, error::Result};

pub struct LqrController {
    k: [f64; 2],
    limits: OutputLimits,
}

impl LqrController {
    pub fn new(gains: LqrGains, limits: OutputLimits) -> Result<Self> {
        require_finite("controller.lqr.k[0]", gains.k[0])?;
        require_finite("controller.lqr.k[1]", gains.k[1])?;
        Ok(Self { k: gains.k, limits })
    }

    /// `[T, dT/dt]` estimated by a backward difference; rate is zero with a single sample.
    pub fn estimate_state(history: &[Sample]) -> Option<[f64; 2]> {
        let latest = history.last()?;
        let rate = match history.len() {
            0 | 1 => 0.0,
            n => {
                let prev = &history[n - 2];
                let dt = latest.time - prev.time;
                if dt > 0.0 {
                    (latest.measurement - prev.measurement) / dt
                } else {
                    0.0
                }
            }
        };
        Some([latest.measurement, rate])
    }
}

impl ControlLaw for LqrController {
    fn step(
        &mut self,
        history: &[Sample],
        setpoint: f64,
        _dt: f64,
    ) -> Result<Option<ActuatorCommand>> {
        let Some(x) = Self::estimate_state(history) else {
            return Ok(None);
        };
        let reference = [setpoint, 0.0];
        let u = -(self.k[0] * (x[0] - reference[0]) + self.k[1] * (x[1] - reference[1]));
        Ok(Some(ActuatorCommand::Level(self.limits.clamp(u))))
    }
}
