//! Flight subsystems
//!
//! Currently one subsystem: the AHRS, covering sensor acquisition and
//! correction, complementary-filter attitude estimation, and accelerometer
//! trim calibration.

pub mod ahrs;
