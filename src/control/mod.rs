// Control: turns recent history and the setpoint into actuator commands.
// PI, LQR and MPC share one step contract and are picked at runtime.

pub mod actuator;
pub mod control_task;
pub mod controller;
pub mod lqr;
pub mod mpc;
pub mod pi;
