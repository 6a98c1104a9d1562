//! Error types shared by the engine, its tasks and the bootstrap code.
//!
//! Four families matter at runtime:
//! - **Configuration:** bad capacity, unknown controller, missing gains. Fail at construction.
//! - **Transient I/O:** sensor/actuator failure or timeout. Logged, skipped, retried next tick.
//! - **Invariant:** non-monotonic sample time. Fatal for the task instance that hit it.
//! - **Lifecycle:** commands the engine refuses in its current state.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("sensor read failed: {0}")]
    Sensor(String),

    #[error("actuator apply failed: {0}")]
    Actuator(String),

    #[error("{operation} did not complete within {timeout_ms} ms")]
    IoTimeout { operation: &'static str, timeout_ms: u64 },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl EngineError {
    /// Transient errors keep a task running; everything else ends the tick or the task.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Sensor(_) | EngineError::Actuator(_) | EngineError::IoTimeout { .. }
        )
    }
}
