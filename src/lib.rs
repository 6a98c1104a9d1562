//! # brewpi
//!
//! Temperature-control engine for a single brewing vessel.
//!
//! Two background tasks share one session history:
//! - **Acquisition** samples the sensor on a fixed cadence, appends to the
//!   [`SharedBuffer`](acquisition::sample_buffer::SharedBuffer) and publishes a
//!   trailing [`WindowView`](acquisition::window::WindowView) for display.
//! - **Control** feeds recent history and the setpoint to the selected
//!   [`Controller`](control::controller::Controller) (PI, LQR or MPC) and applies
//!   the command to the actuator.
//!
//! [`LifecycleManager`](runtime::lifecycle::LifecycleManager) starts and stops
//! both tasks and is the only entry point a front end needs.

pub mod acquisition;
pub mod control;
pub mod runtime;
pub mod simulation;
pub mod utils;
