//! Core infrastructure
//!
//! Fundamental building blocks shared by every subsystem: the smoothed
//! delta-time source used by the periodic estimator loop, the
//! critical-section state cell used for cross-task shared state, and the
//! logging macros.

pub mod logging;
pub mod sync;
pub mod time;

pub use sync::StateCell;
pub use time::DeltaTime;
