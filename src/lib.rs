#![cfg_attr(not(test), no_std)]

//! petrel - flight-control firmware core for small autopilots
//!
//! This library provides the board-independent core of a small flight
//! controller: sensor correction, complementary-filter attitude estimation,
//! flight-mode dispatch, and an object-telemetry protocol engine that
//! exchanges typed state objects with a ground station over framed byte
//! streams.
//!
//! Hardware drivers, the executor binding, and the ground-station side are
//! out of scope; the firmware binary wires queues, transports, and tasks
//! into the entry points exported here.

// Host tests run on the std critical-section implementation.
#[cfg(test)]
use critical_section as _;

// Core systems: delta-time tracking, shared-state cells, logging
pub mod core;

// Data object store: typed state objects, update events, metadata
pub mod objects;

// Communication: object-telemetry protocol engine and transports
pub mod communication;

// Subsystems: AHRS (sensor adapter, estimator, trim)
pub mod subsystems;

// Vehicle logic: flight-mode dispatcher and control handlers
pub mod vehicle;
