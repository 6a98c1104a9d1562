//! Engine configuration.
//!
//! Timing, capacity and display constants carry documented defaults. Controller
//! gains and plant models do not: they describe the physical vessel and have to
//! be supplied by whoever commissions it. A missing table only becomes an error
//! when the matching controller is actually started.

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::utils::error::{EngineError, Result};

pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 3.0;
pub const DEFAULT_HORIZON_SECS: f64 = 30.0;
pub const DEFAULT_INITIAL_CAPACITY: usize = 100;
pub const DEFAULT_IO_TIMEOUT_SECS: f64 = 2.0;
pub const DEFAULT_SETPOINT_C: f64 = 67.0;
pub const DEFAULT_WINDOW_CHANNEL_CAPACITY: usize = 16;
/// Longest accepted tick period or I/O timeout, seconds.
pub const MAX_INTERVAL_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: TimingConfig,
    pub controller: ControllerConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Acquisition tick period, seconds.
    pub acquisition_interval_secs: f64,
    /// Control tick period, seconds.
    pub control_interval_secs: f64,
    /// Trailing display window, seconds.
    pub horizon_secs: f64,
    /// History handed to the controller on each step, seconds.
    pub control_history_secs: f64,
    pub initial_capacity: usize,
    /// Upper bound on a single sensor read or actuator apply, seconds.
    pub io_timeout_secs: f64,
    pub initial_setpoint: f64,
    pub window_channel_capacity: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            acquisition_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            control_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            horizon_secs: DEFAULT_HORIZON_SECS,
            control_history_secs: DEFAULT_HORIZON_SECS,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            io_timeout_secs: DEFAULT_IO_TIMEOUT_SECS,
            initial_setpoint: DEFAULT_SETPOINT_C,
            window_channel_capacity: DEFAULT_WINDOW_CHANNEL_CAPACITY,
        }
    }
}

impl TimingConfig {
    pub fn acquisition_interval(&self) -> Duration {
        Duration::from_secs_f64(self.acquisition_interval_secs)
    }

    pub fn control_interval(&self) -> Duration {
        Duration::from_secs_f64(self.control_interval_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.io_timeout_secs)
    }
}

/// Output limits are shared by every variant; the per-variant tables are optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub output_min: f64,
    pub output_max: f64,
    pub pi: Option<PiGains>,
    pub lqr: Option<LqrGains>,
    pub mpc: Option<MpcModel>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        // Heater duty in percent.
        Self {
            output_min: 0.0,
            output_max: 100.0,
            pi: None,
            lqr: None,
            mpc: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct PiGains {
    pub kp: f64,
    pub ki: f64,
}

/// Precomputed state-feedback row for the state `[temperature, temperature rate]`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct LqrGains {
    pub k: [f64; 2],
}

/// Discrete plant `T[k+1] = a*T[k] + b*u[k] + c` sampled at the control period.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct MpcModel {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub horizon: usize,
    pub input_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub directory: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: "data".into(),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let e = &self.engine;
        interval("engine.acquisition_interval_secs", e.acquisition_interval_secs)?;
        interval("engine.control_interval_secs", e.control_interval_secs)?;
        positive("engine.horizon_secs", e.horizon_secs)?;
        positive("engine.control_history_secs", e.control_history_secs)?;
        interval("engine.io_timeout_secs", e.io_timeout_secs)?;
        if e.initial_capacity == 0 {
            return Err(EngineError::Config(
                "engine.initial_capacity must be greater than zero".into(),
            ));
        }
        if e.window_channel_capacity == 0 {
            return Err(EngineError::Config(
                "engine.window_channel_capacity must be greater than zero".into(),
            ));
        }
        if !e.initial_setpoint.is_finite() {
            return Err(EngineError::Config("engine.initial_setpoint must be finite".into()));
        }

        let c = &self.controller;
        if !(c.output_min.is_finite() && c.output_max.is_finite()) || c.output_min >= c.output_max
        {
            return Err(EngineError::Config(format!(
                "controller output limits must satisfy min < max (got {} .. {})",
                c.output_min, c.output_max
            )));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::Config(format!("{name} must be positive (got {value})")))
    }
}

/// A value that is turned into a `Duration` and added to `Instant`s.
fn interval(name: &str, value: f64) -> Result<()> {
    positive(name, value)?;
    if value > MAX_INTERVAL_SECS {
        return Err(EngineError::Config(format!(
            "{name} must not exceed {MAX_INTERVAL_SECS} s (got {value})"
        )));
    }
    Ok(())
}
