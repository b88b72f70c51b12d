//! Vehicle control logic
//!
//! The flight-mode dispatcher maps the mode switch and override buttons
//! onto a closed set of control handlers and keeps `FlightStatus`
//! consistent with the active mode.

pub mod dispatcher;
pub mod modes;

pub use dispatcher::{ArmToggle, Dispatcher, InputMap, ModeToggle};
pub use modes::{control_chain_for, handler_for, ControlHandler, FlightMode};
