//! sensor.rs
//! Temperature sensor capability consumed by the acquisition task.
//! Reads may block (1-Wire probes take ~750 ms per conversion) and may fail; the task
//! calls them from a guarded worker thread, never from the presentation layer.

use std::sync::Arc;

use crate::utils::error::Result;

pub trait TemperatureSensor: Send + Sync {
    /// One reading in degrees Celsius.
    fn read(&self) -> Result<f64>;

    fn name(&self) -> &str {
        "sensor"
    }
}

impl<S: TemperatureSensor + ?Sized> TemperatureSensor for Arc<S> {
    fn read(&self) -> Result<f64> {
        (**self).read()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
