//! Data object store
//!
//! The object store is the shared-state backbone of the firmware: every
//! piece of state exchanged between tasks or with the ground station is a
//! registered *data object*: a named, typed binary record with one or more
//! instances and a metadata descriptor declaring how telemetry and logging
//! treat it.
//!
//! Objects are registered once at startup and never removed. Producers
//! mutate them through get/set accessors; the telemetry engine observes
//! mutations through event subscriptions.

pub mod catalog;
pub mod events;
pub mod metadata;
pub mod store;
pub mod types;

pub use catalog::{
    AccelState, ArmedState, AttitudeSettings, AttitudeState, ControlChain, FlightStatus,
    GyroState, LinkStatus, LocalLinkStats, ManualCommand, PeerLinkStats, SensorSettings,
    StateObject, TrimFlight,
};
pub use events::{logging_event, periodic_event, PeriodicDispatcher};
pub use metadata::{Metadata, UpdateMode};
pub use store::{
    ObjectError, ObjectStore, SharedStore, SubscriptionId, MAX_INSTANCES, MAX_OBJECTS,
    MAX_OBJECT_SIZE, MAX_SUBSCRIPTIONS,
};
pub use types::{EventKind, EventMask, InstanceId, ObjectId, UpdateEvent, ALL_INSTANCES};
