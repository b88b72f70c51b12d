//! Per-object telemetry and logging metadata

/// Update-mode policy for the telemetry and logging output paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateMode {
    /// Re-send at a fixed interval regardless of change.
    Periodic,
    /// Send only when the value actually mutates.
    OnChange,
    /// On-change, but after any change fall back to periodic for one
    /// interval to bound the maximum update rate, then revert.
    Throttled,
    /// Send only on an explicit external trigger.
    Manual,
}

/// Metadata descriptor attached to every registered object.
///
/// The telemetry and logging paths are governed independently by the same
/// four-mode policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metadata {
    pub telemetry_mode: UpdateMode,
    pub telemetry_period_ms: u32,
    /// Transmissions of this object require a peer acknowledgement.
    pub telemetry_acked: bool,
    pub logging_mode: UpdateMode,
    pub logging_period_ms: u32,
    /// Priority objects ride the high-priority event queue. Settings
    /// objects are implicitly priority.
    pub priority: bool,
}

impl Metadata {
    /// Periodic telemetry at `period_ms`, logging disabled (manual).
    pub const fn periodic(period_ms: u32) -> Self {
        Self {
            telemetry_mode: UpdateMode::Periodic,
            telemetry_period_ms: period_ms,
            telemetry_acked: false,
            logging_mode: UpdateMode::Manual,
            logging_period_ms: 0,
            priority: false,
        }
    }

    /// On-change telemetry, logging disabled.
    pub const fn on_change() -> Self {
        Self {
            telemetry_mode: UpdateMode::OnChange,
            telemetry_period_ms: 0,
            telemetry_acked: false,
            logging_mode: UpdateMode::Manual,
            logging_period_ms: 0,
            priority: false,
        }
    }

    /// Throttled telemetry with the given floor interval.
    pub const fn throttled(period_ms: u32) -> Self {
        Self {
            telemetry_mode: UpdateMode::Throttled,
            telemetry_period_ms: period_ms,
            telemetry_acked: false,
            logging_mode: UpdateMode::Manual,
            logging_period_ms: 0,
            priority: false,
        }
    }

    /// Settings-style metadata: acked on-change telemetry, priority queue.
    pub const fn settings() -> Self {
        Self {
            telemetry_mode: UpdateMode::OnChange,
            telemetry_period_ms: 0,
            telemetry_acked: true,
            logging_mode: UpdateMode::Manual,
            logging_period_ms: 0,
            priority: true,
        }
    }

    /// Builder-style priority flag.
    pub const fn with_priority(mut self) -> Self {
        self.priority = true;
        self
    }

    /// Builder-style acked flag.
    pub const fn with_ack(mut self) -> Self {
        self.telemetry_acked = true;
        self
    }

    /// Builder-style logging policy.
    pub const fn with_logging(mut self, mode: UpdateMode, period_ms: u32) -> Self {
        self.logging_mode = mode;
        self.logging_period_ms = period_ms;
        self
    }
}
