//! kettle.rs
//! First-order thermal model of the vessel, usable as both sensor and actuator.
//!
//! - `dT/dt = heater_gain * level / 100 - loss_rate * (T - ambient)`
//! - Heater level is a duty in percent; `Switch(true)` is full power.
//! - Readings carry uniform noise in `[-noise_c, noise_c]`.
//! - Wall-clock time is scaled by `time_scale` so a demo heats up in minutes, not hours.

use std::time::Instant;

use log::debug;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::acquisition::sensor::TemperatureSensor;
use crate::control::actuator::{Actuator, ActuatorCommand};
use crate::utils::error::{EngineError, Result};

#[derive(Debug, Clone, Copy)]
pub struct KettleParams {
    pub ambient_c: f64,
    pub initial_c: f64,
    /// Heating rate at full power, °C per second.
    pub heater_gain: f64,
    /// Newtonian loss coefficient, 1/s.
    pub loss_rate: f64,
    pub noise_c: f64,
    pub time_scale: f64,
}

impl Default for KettleParams {
    fn default() -> Self {
        Self {
            ambient_c: 20.0,
            initial_c: 20.0,
            heater_gain: 0.5,
            loss_rate: 0.004,
            noise_c: 0.1,
            time_scale: 1.0,
        }
    }
}

struct KettleState {
    temperature: f64,
    level: f64,
    last_update: Instant,
    rng: StdRng,
}

pub struct SimulatedKettle {
    params: KettleParams,
    state: Mutex<KettleState>,
}

impl SimulatedKettle {
    pub fn new(params: KettleParams) -> Self {
        Self::with_rng(params, StdRng::from_os_rng())
    }

    /// Reproducible noise for tests and benchmarks.
    pub fn seeded(params: KettleParams, seed: u64) -> Self {
        Self::with_rng(params, StdRng::seed_from_u64(seed))
    }

    fn with_rng(params: KettleParams, rng: StdRng) -> Self {
        Self {
            state: Mutex::new(KettleState {
                temperature: params.initial_c,
                level: 0.0,
                last_update: Instant::now(),
                rng,
            }),
            params,
        }
    }

    /// Integrates the model forward by `secs` of simulated time.
    pub fn advance(&self, secs: f64) {
        let mut state = self.state.lock();
        Self::integrate(&self.params, &mut state, secs);
    }

    /// Noise-free temperature.
    pub fn temperature(&self) -> f64 {
        self.state.lock().temperature
    }

    pub fn heater_level(&self) -> f64 {
        self.state.lock().level
    }

    fn integrate(params: &KettleParams, state: &mut KettleState, secs: f64) {
        // Sub-step so large gaps between reads stay stable.
        const MAX_STEP: f64 = 0.5;
        let mut remaining = secs.max(0.0);
        while remaining > 0.0 {
            let h = remaining.min(MAX_STEP);
            let heating = params.heater_gain * state.level / 100.0;
            let loss = params.loss_rate * (state.temperature - params.ambient_c);
            state.temperature += h * (heating - loss);
            remaining -= h;
        }
    }

    /// Brings the model up to wall-clock now.
    fn catch_up(&self, state: &mut KettleState) {
        let now = Instant::now();
        let secs = now.duration_since(state.last_update).as_secs_f64() * self.params.time_scale;
        state.last_update = now;
        Self::integrate(&self.params, state, secs);
    }
}

impl TemperatureSensor for SimulatedKettle {
    fn read(&self) -> Result<f64> {
        let mut state = self.state.lock();
        self.catch_up(&mut state);
        let noise = if self.params.noise_c > 0.0 {
            state.rng.random_range(-self.params.noise_c..=self.params.noise_c)
        } else {
            0.0
        };
        Ok(state.temperature + noise)
    }

    fn name(&self) -> &str {
        "simulated kettle"
    }
}

impl Actuator for SimulatedKettle {
    fn apply(&self, command: ActuatorCommand) -> Result<()> {
        let level = match command {
            ActuatorCommand::Level(v) if v.is_finite() => v.clamp(0.0, 100.0),
            ActuatorCommand::Level(v) => {
                return Err(EngineError::Actuator(format!("heater level {v} is not finite")));
            }
            ActuatorCommand::Switch(true) => 100.0,
            ActuatorCommand::Switch(false) => 0.0,
        };
        let mut state = self.state.lock();
        self.catch_up(&mut state);
        state.level = level;
        debug!("[Kettle] heater level {:.1}%", level);
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated heater"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> KettleParams {
        KettleParams {
            noise_c: 0.0,
            ..KettleParams::default()
        }
    }

    #[test]
    fn idle_kettle_stays_at_ambient() {
        let kettle = SimulatedKettle::seeded(quiet(), 1);
        kettle.advance(600.0);
        assert!((kettle.temperature() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn full_power_heats_and_settles_below_equilibrium() {
        let kettle = SimulatedKettle::seeded(quiet(), 1);
        kettle.apply(ActuatorCommand::Switch(true)).unwrap();
        kettle.advance(60.0);
        let warm = kettle.temperature();
        assert!(warm > 40.0, "got {warm}");
        // Equilibrium: ambient + gain / loss = 20 + 125.
        kettle.advance(10_000.0);
        assert!(kettle.temperature() < 145.0 + 1e-6);
    }

    #[test]
    fn level_is_clamped_and_nan_rejected() {
        let kettle = SimulatedKettle::seeded(quiet(), 1);
        kettle.apply(ActuatorCommand::Level(250.0)).unwrap();
        assert_eq!(kettle.heater_level(), 100.0);
        assert!(kettle.apply(ActuatorCommand::Level(f64::NAN)).is_err());
    }

    #[test]
    fn noise_stays_within_bounds() {
        let kettle = SimulatedKettle::seeded(
            KettleParams {
                noise_c: 0.2,
                ..KettleParams::default()
            },
            7,
        );
        for _ in 0..100 {
            let t = kettle.read().unwrap();
            assert!((t - 20.0).abs() <= 0.2 + 1e-9);
        }
    }
}
