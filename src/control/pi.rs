//! Proportional-integral law on `setpoint - measurement`.
//!
//! Built on the `pidgeon` PID with the derivative gain fixed at zero. Anti-windup is
//! enabled so the integrator stops accumulating while the output sits at a limit.
//! `pidgeon` answers its very first `compute` with zero; that call is spent once with
//! `dt = 0` so the first real step already acts on the error.

use pidgeon::{ControllerConfig as PidConfig, PidController};

use crate::acquisition::sample_buffer::Sample;
use crate::control::{
    actuator::ActuatorCommand,
    controller::{ControlLaw, OutputLimits, require_finite},
};
use crate::utils::{
    config::PiGains,
    error::{EngineError, Result},
};

pub struct PiController {
    pid: PidController,
    limits: OutputLimits,
    current_target: Option<f64>,
    primed: bool,
}

impl PiController {
    pub fn new(gains: PiGains, limits: OutputLimits) -> Result<Self> {
        require_finite("controller.pi.kp", gains.kp)?;
        require_finite("controller.pi.ki", gains.ki)?;
        if gains.kp < 0.0 || gains.ki < 0.0 {
            return Err(EngineError::Config(format!(
                "PI gains must be non-negative (kp={}, ki={})",
                gains.kp, gains.ki
            )));
        }

        let config = PidConfig::new()
            .with_kp(gains.kp)
            .with_ki(gains.ki)
            .with_kd(0.0)
            .with_output_limits(limits.min, limits.max)
            .with_anti_windup(true);

        Ok(Self {
            pid: PidController::new(config),
            limits,
            current_target: None,
            primed: false,
        })
    }
}

impl ControlLaw for PiController {
    fn step(
        &mut self,
        history: &[Sample],
        setpoint: f64,
        dt: f64,
    ) -> Result<Option<ActuatorCommand>> {
        let Some(latest) = history.last() else {
            return Ok(None);
        };

        if self.current_target != Some(setpoint) {
            self.pid
                .set_setpoint(setpoint)
                .map_err(|e| EngineError::Config(format!("PI setpoint rejected: {e:?}")))?;
            self.current_target = Some(setpoint);
        }

        if !self.primed {
            self.pid.compute(latest.measurement, 0.0);
            self.primed = true;
        }
        let output = self.pid.compute(latest.measurement, dt);
        Ok(Some(ActuatorCommand::Level(self.limits.clamp(output))))
    }
}
