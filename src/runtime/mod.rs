// Runtime plumbing shared by both background tasks: cancellation,
// bounded device calls, release schedule, setpoint cell and the
// start/stop lifecycle.

pub mod cancel;
pub mod guarded_io;
pub mod lifecycle;
pub mod schedule;
pub mod setpoint;
