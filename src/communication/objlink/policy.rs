//! Update-mode policy mapping
//!
//! Translates an object's metadata into the event mask its telemetry (or
//! logging) subscription should carry and the period its periodic timer
//! should run at.
//!
//! Throttled mode is phase dependent. Cold, the subscription listens for
//! value changes; a change is sent immediately and flips the phase to hot.
//! Hot, changes are masked out and the subscription waits for the next
//! periodic tick, which re-sends the current value once and reverts to
//! cold. The result is at most one tx per period under a burst of changes.

use crate::objects::{EventMask, Metadata, UpdateMode};

/// Event mask for the telemetry path of an object.
pub fn telemetry_mask(meta: &Metadata, hot: bool) -> EventMask {
    let base = EventMask::UPDATED_MANUAL | EventMask::UPDATE_REQ;
    match meta.telemetry_mode {
        UpdateMode::Periodic => base | EventMask::UPDATED_PERIODIC,
        UpdateMode::OnChange => base | EventMask::UPDATED,
        UpdateMode::Throttled => {
            if hot {
                base | EventMask::UPDATED_PERIODIC
            } else {
                base | EventMask::UPDATED
            }
        }
        UpdateMode::Manual => base,
    }
}

/// Periodic-timer interval for the telemetry path, 0 meaning disabled.
pub fn telemetry_period(meta: &Metadata) -> u32 {
    match meta.telemetry_mode {
        UpdateMode::Periodic | UpdateMode::Throttled => meta.telemetry_period_ms,
        UpdateMode::OnChange | UpdateMode::Manual => 0,
    }
}

/// Event mask for the logging path of an object.
pub fn logging_mask(meta: &Metadata, hot: bool) -> EventMask {
    let base = EventMask::LOGGING_MANUAL;
    match meta.logging_mode {
        UpdateMode::Periodic => base | EventMask::LOGGING_PERIODIC,
        UpdateMode::OnChange => base | EventMask::UPDATED,
        UpdateMode::Throttled => {
            if hot {
                base | EventMask::LOGGING_PERIODIC
            } else {
                base | EventMask::UPDATED
            }
        }
        UpdateMode::Manual => base,
    }
}

/// Periodic-timer interval for the logging path, 0 meaning disabled.
pub fn logging_period(meta: &Metadata) -> u32 {
    match meta.logging_mode {
        UpdateMode::Periodic | UpdateMode::Throttled => meta.logging_period_ms,
        UpdateMode::OnChange | UpdateMode::Manual => 0,
    }
}
