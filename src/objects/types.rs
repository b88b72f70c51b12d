//! Object identifiers and update events

use bitflags::bitflags;

/// Unique identifier of a registered data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// Sentinel id carried by events that do not refer to an object
    /// (e.g. the periodic statistics tick).
    pub const NONE: ObjectId = ObjectId(0);
}

/// Instance index within a multi-instance object.
pub type InstanceId = u16;

/// Addresses every instance of an object at once.
pub const ALL_INSTANCES: InstanceId = 0xFFFF;

bitflags! {
    /// Subscription mask selecting which event kinds a queue receives.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u8 {
        /// Object value changed.
        const UPDATED          = 0x01;
        /// Explicit transmission trigger.
        const UPDATED_MANUAL   = 0x02;
        /// Periodic transmission tick.
        const UPDATED_PERIODIC = 0x04;
        /// Object update requested from the peer.
        const UPDATE_REQ       = 0x08;
        /// Explicit logging trigger.
        const LOGGING_MANUAL   = 0x10;
        /// Periodic logging tick.
        const LOGGING_PERIODIC = 0x20;
    }
}

/// Why an object needs transmission or logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// No event; used to (re)compute subscriptions at registration time.
    None,
    Updated,
    UpdatedManual,
    UpdatedPeriodic,
    UpdateRequest,
    LoggingManual,
    LoggingPeriodic,
}

impl EventKind {
    /// The mask bit this event kind matches against.
    pub fn mask(self) -> EventMask {
        match self {
            EventKind::None => EventMask::empty(),
            EventKind::Updated => EventMask::UPDATED,
            EventKind::UpdatedManual => EventMask::UPDATED_MANUAL,
            EventKind::UpdatedPeriodic => EventMask::UPDATED_PERIODIC,
            EventKind::UpdateRequest => EventMask::UPDATE_REQ,
            EventKind::LoggingManual => EventMask::LOGGING_MANUAL,
            EventKind::LoggingPeriodic => EventMask::LOGGING_PERIODIC,
        }
    }
}

/// An immutable message describing why an object needs attention.
///
/// Created by the object store (or the periodic dispatcher) on mutation and
/// consumed exactly once by the telemetry engine's dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateEvent {
    pub object: ObjectId,
    pub instance: InstanceId,
    pub kind: EventKind,
}

impl UpdateEvent {
    /// The periodic statistics tick consumed by the connection supervisor.
    pub const fn stats_tick() -> Self {
        Self {
            object: ObjectId::NONE,
            instance: 0,
            kind: EventKind::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_single_mask_bit() {
        let kinds = [
            EventKind::Updated,
            EventKind::UpdatedManual,
            EventKind::UpdatedPeriodic,
            EventKind::UpdateRequest,
            EventKind::LoggingManual,
            EventKind::LoggingPeriodic,
        ];
        for kind in kinds {
            assert_eq!(kind.mask().bits().count_ones(), 1);
        }
        assert!(EventKind::None.mask().is_empty());
    }
}
