//! Flight-mode dispatcher
//!
//! Re-evaluated once per control cycle: reads `ManualCommand` and
//! `FlightStatus`, resolves the switch position through the configured
//! position table, applies the button edges, and on a mode change
//! atomically writes flight mode and control chain into `FlightStatus`
//! before invoking the mode handler with a fresh-entry flag.
//!
//! Button handling is configuration, not hard-coded controller masks: the
//! arm combo and the sub-mode toggle each carry their own button masks in
//! [`InputMap`].

use crate::objects::{ArmedState, FlightStatus, ManualCommand, SharedStore};
use crate::log_info;

use super::modes::{control_chain_for, handler_for, FlightMode};

/// Maximum switch positions on the mode selector.
pub const MAX_SWITCH_POSITIONS: usize = 6;

/// Two-button combination that toggles arming on its rising edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmToggle {
    /// Button mask in bank 0 and bank 1; the combo is active when every
    /// set bit is pressed.
    pub mask: [u8; 2],
    was_active: bool,
}

impl ArmToggle {
    pub const fn new(mask: [u8; 2]) -> Self {
        Self {
            mask,
            was_active: false,
        }
    }

    /// Feed the current button state; true exactly on the rising edge of
    /// the full combination.
    pub fn rising_edge(&mut self, buttons: [u8; 2]) -> bool {
        let active = (buttons[0] & self.mask[0]) == self.mask[0]
            && (buttons[1] & self.mask[1]) == self.mask[1]
            && (self.mask[0] | self.mask[1]) != 0;
        let edge = active && !self.was_active;
        self.was_active = active;
        edge
    }
}

/// Single-button edge that alternates between two stabilized sub-modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeToggle {
    /// Button mask in bank 0.
    pub mask: u8,
    /// The two banks to alternate between.
    pub banks: (u8, u8),
    was_active: bool,
    /// No override until the first edge; afterwards, which bank is selected.
    selected_second: Option<bool>,
}

impl ModeToggle {
    pub const fn new(mask: u8, banks: (u8, u8)) -> Self {
        Self {
            mask,
            banks,
            was_active: false,
            selected_second: None,
        }
    }

    /// Feed the current button state; returns the bank override once the
    /// toggle has been used. Each rising edge flips the selection, starting
    /// with the second bank. Untouched, the configured position table
    /// stands.
    pub fn current_bank(&mut self, buttons: [u8; 2]) -> Option<u8> {
        let active = self.mask != 0 && (buttons[0] & self.mask) == self.mask;
        if active && !self.was_active {
            self.selected_second = Some(self.selected_second != Some(true));
        }
        self.was_active = active;
        self.selected_second
            .map(|second| if second { self.banks.1 } else { self.banks.0 })
    }
}

/// Operator input configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputMap {
    /// Switch position to flight mode, indexed by position.
    pub position_modes: [FlightMode; MAX_SWITCH_POSITIONS],
    pub arm_combo: [u8; 2],
    pub mode_toggle_mask: u8,
    pub mode_toggle_banks: (u8, u8),
}

impl Default for InputMap {
    fn default() -> Self {
        Self {
            position_modes: [
                FlightMode::Manual,
                FlightMode::Stabilized(1),
                FlightMode::Stabilized(2),
                FlightMode::Stabilized(3),
                FlightMode::PathFollower,
                FlightMode::PathPlanner,
            ],
            arm_combo: [0x30, 0x00],
            mode_toggle_mask: 0x01,
            mode_toggle_banks: (1, 2),
        }
    }
}

/// Per-cycle flight-mode resolution and handler dispatch.
pub struct Dispatcher {
    map: InputMap,
    arm_toggle: ArmToggle,
    mode_toggle: ModeToggle,
    active_mode: Option<FlightMode>,
}

impl Dispatcher {
    pub fn new(map: InputMap) -> Self {
        Self {
            map,
            arm_toggle: ArmToggle::new(map.arm_combo),
            mode_toggle: ModeToggle::new(map.mode_toggle_mask, map.mode_toggle_banks),
            active_mode: None,
        }
    }

    pub fn active_mode(&self) -> Option<FlightMode> {
        self.active_mode
    }

    /// One control cycle.
    pub fn run_cycle(&mut self, store: &SharedStore) {
        let (command, mut status) = store.with(|s| {
            let command: ManualCommand = s.get_object().unwrap_or_default();
            let status: FlightStatus = s.get_object().unwrap_or_default();
            (command, status)
        });

        let mut dirty = false;

        if self.arm_toggle.rising_edge(command.buttons) {
            status.armed = match status.armed {
                ArmedState::Disarmed => ArmedState::Arming,
                ArmedState::Arming | ArmedState::Armed => ArmedState::Disarmed,
            };
            log_info!("arm toggle -> {}", status.armed as u8);
            dirty = true;
        }

        let position = usize::from(command.switch_position).min(MAX_SWITCH_POSITIONS - 1);
        let mut mode = self.map.position_modes[position];
        if let FlightMode::Stabilized(_) = mode {
            if let Some(bank) = self.mode_toggle.current_bank(command.buttons) {
                mode = FlightMode::Stabilized(bank);
            }
        }

        let fresh_entry = self.active_mode != Some(mode);
        if fresh_entry {
            self.active_mode = Some(mode);
            status.flight_mode = mode.to_u8();
            status.control_chain = control_chain_for(mode);
            dirty = true;
        }

        // Status must be visible before the handler observes the mode.
        if dirty {
            store.with_mut(|s| {
                let _ = s.set_object(&status);
            });
        }

        handler_for(mode).run(fresh_entry);
    }
}
