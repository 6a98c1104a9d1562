//! Shared target temperature. One writer (operator commands), many readers (both tasks).
//! Stored as the bit pattern of an `f64` in an `AtomicU64`, so a read never sees half a write.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::utils::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct Setpoint {
    bits: Arc<AtomicU64>,
}

impl Setpoint {
    pub fn new(initial: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(initial.to_bits())),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Rejects NaN and infinities; the previous value stays in place.
    pub fn set(&self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(EngineError::Config(format!("setpoint must be finite (got {value})")));
        }
        self.bits.store(value.to_bits(), Ordering::Release);
        Ok(())
    }
}
