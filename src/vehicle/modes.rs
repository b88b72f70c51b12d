//! Flight modes and control handlers
//!
//! The mode set is closed: every mode maps to exactly one handler variant
//! and one control-chain configuration through total matches. An unmapped
//! mode is a compile-time error, never a runtime fallback.

use crate::objects::ControlChain;
use crate::log_info;

/// Selectable flight modes. Stabilized banks carry their bank index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlightMode {
    Manual,
    /// Stabilized bank 1..=6.
    Stabilized(u8),
    PathFollower,
    PathPlanner,
    AutoTune,
}

impl FlightMode {
    /// Wire encoding used in `FlightStatus.flight_mode`.
    pub fn to_u8(self) -> u8 {
        match self {
            FlightMode::Manual => 0,
            FlightMode::Stabilized(bank) => bank,
            FlightMode::PathFollower => 7,
            FlightMode::PathPlanner => 8,
            FlightMode::AutoTune => 9,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(FlightMode::Manual),
            1..=6 => Some(FlightMode::Stabilized(v)),
            7 => Some(FlightMode::PathFollower),
            8 => Some(FlightMode::PathPlanner),
            9 => Some(FlightMode::AutoTune),
            _ => None,
        }
    }
}

/// Control handler variants, one per flight mode family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlHandler {
    Manual,
    Stabilized { bank: u8 },
    PathFollower,
    PathPlanner,
    AutoTune,
}

impl ControlHandler {
    /// Run the handler for one control cycle. `fresh_entry` is set on the
    /// first cycle after a mode change so one-time setup can run.
    ///
    /// The actual control laws (stabilization loops, path following) are
    /// firmware-side; the core handler records entry transitions and keeps
    /// the dispatch seam in one place.
    pub fn run(&self, fresh_entry: bool) {
        if fresh_entry {
            match self {
                ControlHandler::Manual => log_info!("control: manual"),
                ControlHandler::Stabilized { bank } => {
                    log_info!("control: stabilized bank {}", *bank)
                }
                ControlHandler::PathFollower => log_info!("control: path follower"),
                ControlHandler::PathPlanner => log_info!("control: path planner"),
                ControlHandler::AutoTune => log_info!("control: autotune"),
            }
        }
    }
}

/// Handler for a mode. Total match; the mode set is closed.
pub fn handler_for(mode: FlightMode) -> ControlHandler {
    match mode {
        FlightMode::Manual => ControlHandler::Manual,
        FlightMode::Stabilized(bank) => ControlHandler::Stabilized { bank },
        FlightMode::PathFollower => ControlHandler::PathFollower,
        FlightMode::PathPlanner => ControlHandler::PathPlanner,
        FlightMode::AutoTune => ControlHandler::AutoTune,
    }
}

/// Control stages active in a mode.
pub fn control_chain_for(mode: FlightMode) -> ControlChain {
    match mode {
        FlightMode::Manual => ControlChain {
            stabilization: false,
            path_follower: false,
            path_planner: false,
        },
        FlightMode::Stabilized(_) | FlightMode::AutoTune => ControlChain {
            stabilization: true,
            path_follower: false,
            path_planner: false,
        },
        FlightMode::PathFollower => ControlChain {
            stabilization: true,
            path_follower: true,
            path_planner: false,
        },
        FlightMode::PathPlanner => ControlChain {
            stabilization: true,
            path_follower: true,
            path_planner: true,
        },
    }
}
