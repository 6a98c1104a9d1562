//! Receding-horizon law on a first-order discrete plant.
//!
//! Model: `T[k+1] = a*T[k] + b*u + c`, sampled at the control period. The input is held
//! constant over the `N`-step horizon (move blocking), which turns the optimisation
//!
//! ```text
//! min_u  sum_{k=1..N} (T[k] - r)^2 + lambda * N * u^2
//! ```
//!
//! into a scalar least-squares problem with a closed-form minimiser, clamped to the output
//! limits. Cost is O(N) per step, well inside any control period the engine accepts.

use crate::acquisition::sample_buffer::Sample;
use crate::control::{
    actuator::ActuatorCommand,
    controller::{ControlLaw, OutputLimits, require_finite},
};
use crate::utils::{
    config::MpcModel,
    error::{EngineError, Result},
};

pub struct MpcController {
    model: MpcModel,
    limits: OutputLimits,
    last_command: Option<f64>,
}

impl MpcController {
    pub fn new(model: MpcModel, limits: OutputLimits) -> Result<Self> {
        require_finite("controller.mpc.a", model.a)?;
        require_finite("controller.mpc.b", model.b)?;
        require_finite("controller.mpc.c", model.c)?;
        require_finite("controller.mpc.input_weight", model.input_weight)?;
        if model.horizon == 0 {
            return Err(EngineError::Config("controller.mpc.horizon must be at least 1".into()));
        }
        if model.b == 0.0 {
            return Err(EngineError::Config(
                "controller.mpc.b is zero: the input has no effect on the model".into(),
            ));
        }
        if model.input_weight < 0.0 {
            return Err(EngineError::Config(
                "controller.mpc.input_weight must be non-negative".into(),
            ));
        }
        Ok(Self {
            model,
            limits,
            last_command: None,
        })
    }

    /// Predicted temperatures `T[1..=N]` from `t0` under a constant input `u`.
    pub fn predict(&self, t0: f64, u: f64) -> Vec<f64> {
        let MpcModel { a, b, c, horizon, .. } = self.model;
        let mut t = t0;
        (0..horizon)
            .map(|_| {
                t = a * t + b * u + c;
                t
            })
            .collect()
    }

    /// Unconstrained minimiser of the horizon cost, before clamping.
    fn optimal_input(&self, t0: f64, setpoint: f64) -> f64 {
        let MpcModel {
            a,
            b,
            c,
            horizon,
            input_weight,
        } = self.model;

        // T[k] = alpha_k + beta_k * u, with alpha/beta built up recursively.
        let (mut alpha, mut beta) = (t0, 0.0);
        let (mut num, mut den) = (0.0, 0.0);
        for _ in 0..horizon {
            alpha = a * alpha + c;
            beta = a * beta + b;
            num += beta * (setpoint - alpha);
            den += beta * beta;
        }
        den += input_weight * horizon as f64;
        num / den
    }

    pub fn last_command(&self) -> Option<f64> {
        self.last_command
    }
}

impl ControlLaw for MpcController {
    fn step(
        &mut self,
        history: &[Sample],
        setpoint: f64,
        _dt: f64,
    ) -> Result<Option<ActuatorCommand>> {
        let Some(latest) = history.last() else {
            return Ok(None);
        };
        let u = self.limits.clamp(self.optimal_input(latest.measurement, setpoint));
        self.last_command = Some(u);
        Ok(Some(ActuatorCommand::Level(u)))
    }
}
