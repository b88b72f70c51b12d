//! Fixed-table object store with event subscriptions
//!
//! Objects are registered once at init into a fixed-capacity table and are
//! never removed. `set` compares against the stored bytes and fires
//! [`EventKind::Updated`] events only on an actual value change, which is
//! what makes the on-change telemetry policy work.
//!
//! Subscribers attach a queue sender under an [`EventMask`]; the mask can be
//! swapped later (the throttled telemetry policy re-masks its subscription
//! on every event).

use embassy_sync::channel::DynamicSender;
use heapless::Vec;

use super::catalog::StateObject;
use super::metadata::Metadata;
use super::types::{EventKind, EventMask, InstanceId, ObjectId, UpdateEvent};
use crate::core::StateCell;

/// Largest object payload the store will hold.
pub const MAX_OBJECT_SIZE: usize = 96;
/// Capacity of the registration table.
pub const MAX_OBJECTS: usize = 24;
/// Maximum instances of a multi-instance object.
pub const MAX_INSTANCES: usize = 4;
/// Maximum concurrent event subscriptions.
pub const MAX_SUBSCRIPTIONS: usize = 32;

/// Store shared between tasks.
pub type SharedStore = StateCell<ObjectStore>;

/// Errors returned by store accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ObjectError {
    /// Object id is not registered.
    UnknownObject,
    /// Instance index out of range.
    NoSuchInstance,
    /// Payload length does not match the registered size.
    SizeMismatch,
    /// Registration table or subscription table is full.
    TableFull,
    /// Object id registered twice.
    DuplicateObject,
    /// Stored bytes failed typed decoding.
    DecodeFailed,
}

/// Handle to an event subscription, used to swap its mask later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(usize);

struct Subscription {
    object: ObjectId,
    mask: EventMask,
    sender: DynamicSender<'static, UpdateEvent>,
}

struct Entry {
    id: ObjectId,
    name: &'static str,
    single_instance: bool,
    meta: Metadata,
    instances: Vec<Vec<u8, MAX_OBJECT_SIZE>, MAX_INSTANCES>,
}

/// Append-style fixed-table object store.
pub struct ObjectStore {
    entries: Vec<Entry, MAX_OBJECTS>,
    subscriptions: Vec<Subscription, MAX_SUBSCRIPTIONS>,
    /// Events dropped because a subscriber queue was full.
    event_errors: u32,
}

impl ObjectStore {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            subscriptions: Vec::new(),
            event_errors: 0,
        }
    }

    /// Register a raw object with a zero-filled first instance.
    pub fn register_raw(
        &mut self,
        id: ObjectId,
        name: &'static str,
        single_instance: bool,
        size: usize,
        meta: Metadata,
    ) -> Result<(), ObjectError> {
        if size > MAX_OBJECT_SIZE {
            return Err(ObjectError::SizeMismatch);
        }
        if self.find(id).is_some() {
            return Err(ObjectError::DuplicateObject);
        }
        let mut first = Vec::new();
        first.resize_default(size).map_err(|_| ObjectError::SizeMismatch)?;
        let mut instances = Vec::new();
        instances.push(first).map_err(|_| ObjectError::TableFull)?;
        self.entries
            .push(Entry {
                id,
                name,
                single_instance,
                meta,
                instances,
            })
            .map_err(|_| ObjectError::TableFull)
    }

    /// Register a typed object, initialised to its `Default` encoding.
    pub fn register<T: StateObject>(&mut self, meta: Metadata) -> Result<(), ObjectError> {
        self.register_raw(T::ID, T::NAME, T::SINGLE_INSTANCE, T::SIZE, meta)?;
        let mut buf = [0u8; MAX_OBJECT_SIZE];
        T::default().encode(&mut buf[..T::SIZE]);
        // Initial encoding, no event.
        let entry = self.find_mut(T::ID).ok_or(ObjectError::UnknownObject)?;
        entry.instances[0].clear();
        entry.instances[0]
            .extend_from_slice(&buf[..T::SIZE])
            .map_err(|_| ObjectError::SizeMismatch)
    }

    fn find(&self, id: ObjectId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn find_mut(&mut self, id: ObjectId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.find(id).is_some()
    }

    /// Registered payload size of `id`.
    pub fn size_of(&self, id: ObjectId) -> Result<usize, ObjectError> {
        Ok(self.find(id).ok_or(ObjectError::UnknownObject)?.instances[0].len())
    }

    /// Whether `id` is single-instance (affects the wire format).
    pub fn is_single_instance(&self, id: ObjectId) -> Result<bool, ObjectError> {
        Ok(self.find(id).ok_or(ObjectError::UnknownObject)?.single_instance)
    }

    /// Number of live instances of `id`.
    pub fn num_instances(&self, id: ObjectId) -> Result<usize, ObjectError> {
        Ok(self.find(id).ok_or(ObjectError::UnknownObject)?.instances.len())
    }

    /// Registered name of `id`.
    pub fn name_of(&self, id: ObjectId) -> Result<&'static str, ObjectError> {
        Ok(self.find(id).ok_or(ObjectError::UnknownObject)?.name)
    }

    /// Copy the current value of an instance into `buf`, returning its size.
    pub fn get(
        &self,
        id: ObjectId,
        instance: InstanceId,
        buf: &mut [u8],
    ) -> Result<usize, ObjectError> {
        let entry = self.find(id).ok_or(ObjectError::UnknownObject)?;
        let data = entry
            .instances
            .get(instance as usize)
            .ok_or(ObjectError::NoSuchInstance)?;
        if buf.len() < data.len() {
            return Err(ObjectError::SizeMismatch);
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    /// Write an instance. Fires an `Updated` event only when the bytes
    /// actually change; returns whether they did.
    ///
    /// Writing to instance `num_instances` of a multi-instance object
    /// creates that instance (the telemetry receive path relies on this).
    pub fn set(
        &mut self,
        id: ObjectId,
        instance: InstanceId,
        data: &[u8],
    ) -> Result<bool, ObjectError> {
        let entry = self.find_mut(id).ok_or(ObjectError::UnknownObject)?;
        if data.len() != entry.instances[0].len() {
            return Err(ObjectError::SizeMismatch);
        }
        let idx = instance as usize;
        let changed = match entry.instances.get_mut(idx) {
            Some(existing) => {
                if existing.as_slice() == data {
                    false
                } else {
                    existing.clear();
                    existing
                        .extend_from_slice(data)
                        .map_err(|_| ObjectError::SizeMismatch)?;
                    true
                }
            }
            None => {
                if entry.single_instance || idx != entry.instances.len() {
                    return Err(ObjectError::NoSuchInstance);
                }
                let mut fresh = Vec::new();
                fresh
                    .extend_from_slice(data)
                    .map_err(|_| ObjectError::SizeMismatch)?;
                entry.instances.push(fresh).map_err(|_| ObjectError::TableFull)?;
                true
            }
        };
        if changed {
            self.fire(id, instance, EventKind::Updated);
        }
        Ok(changed)
    }

    /// Write an instance unconditionally, firing `Updated` even when the
    /// bytes are identical.
    pub fn set_always(
        &mut self,
        id: ObjectId,
        instance: InstanceId,
        data: &[u8],
    ) -> Result<(), ObjectError> {
        let changed = self.set(id, instance, data)?;
        if !changed {
            self.fire(id, instance, EventKind::Updated);
        }
        Ok(())
    }

    /// Fire an explicit transmission trigger for an instance.
    pub fn updated_manual(&mut self, id: ObjectId, instance: InstanceId) {
        self.fire(id, instance, EventKind::UpdatedManual);
    }

    /// Request this object from the peer (fires `UpdateRequest`).
    pub fn request_update(&mut self, id: ObjectId, instance: InstanceId) {
        self.fire(id, instance, EventKind::UpdateRequest);
    }

    /// Fire an explicit logging trigger for an instance.
    pub fn logging_manual(&mut self, id: ObjectId, instance: InstanceId) {
        self.fire(id, instance, EventKind::LoggingManual);
    }

    /// Read the metadata descriptor of `id`.
    pub fn metadata(&self, id: ObjectId) -> Result<Metadata, ObjectError> {
        Ok(self.find(id).ok_or(ObjectError::UnknownObject)?.meta)
    }

    /// Replace the metadata descriptor of `id`. The telemetry engine must be
    /// asked to refresh the object's policy afterwards.
    pub fn set_metadata(&mut self, id: ObjectId, meta: Metadata) -> Result<(), ObjectError> {
        self.find_mut(id).ok_or(ObjectError::UnknownObject)?.meta = meta;
        Ok(())
    }

    /// Visit every registered object.
    pub fn iterate(&self, mut f: impl FnMut(ObjectId, &Metadata)) {
        for entry in &self.entries {
            f(entry.id, &entry.meta);
        }
    }

    /// Attach a queue sender under `mask`. The returned id can be used to
    /// swap the mask later.
    pub fn subscribe(
        &mut self,
        object: ObjectId,
        mask: EventMask,
        sender: DynamicSender<'static, UpdateEvent>,
    ) -> Result<SubscriptionId, ObjectError> {
        if !self.contains(object) {
            return Err(ObjectError::UnknownObject);
        }
        let idx = self.subscriptions.len();
        self.subscriptions
            .push(Subscription {
                object,
                mask,
                sender,
            })
            .map_err(|_| ObjectError::TableFull)?;
        Ok(SubscriptionId(idx))
    }

    /// Swap the mask of an existing subscription.
    pub fn set_subscription_mask(&mut self, sub: SubscriptionId, mask: EventMask) {
        if let Some(s) = self.subscriptions.get_mut(sub.0) {
            s.mask = mask;
        }
    }

    /// Events dropped because a subscriber queue was full.
    pub fn event_errors(&self) -> u32 {
        self.event_errors
    }

    fn fire(&mut self, object: ObjectId, instance: InstanceId, kind: EventKind) {
        let ev = UpdateEvent {
            object,
            instance,
            kind,
        };
        let mut dropped = 0u32;
        for sub in &self.subscriptions {
            if sub.object == object
                && sub.mask.intersects(kind.mask())
                && sub.sender.try_send(ev).is_err()
            {
                dropped += 1;
            }
        }
        self.event_errors = self.event_errors.wrapping_add(dropped);
    }

    /// Decode instance 0 of a typed object.
    pub fn get_object<T: StateObject>(&self) -> Result<T, ObjectError> {
        self.get_object_instance(0)
    }

    /// Decode a specific instance of a typed object.
    pub fn get_object_instance<T: StateObject>(
        &self,
        instance: InstanceId,
    ) -> Result<T, ObjectError> {
        let mut buf = [0u8; MAX_OBJECT_SIZE];
        let n = self.get(T::ID, instance, &mut buf)?;
        T::decode(&buf[..n]).ok_or(ObjectError::DecodeFailed)
    }

    /// Encode and write instance 0 of a typed object.
    pub fn set_object<T: StateObject>(&mut self, value: &T) -> Result<bool, ObjectError> {
        let mut buf = [0u8; MAX_OBJECT_SIZE];
        value.encode(&mut buf[..T::SIZE]);
        self.set(T::ID, 0, &buf[..T::SIZE])
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::catalog::GyroState;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::channel::Channel;

    fn store_with_gyro() -> ObjectStore {
        let mut store = ObjectStore::new();
        store.register::<GyroState>(Metadata::periodic(100)).unwrap();
        store
    }

    #[test]
    fn typed_round_trip() {
        let mut store = store_with_gyro();
        let gyro = GyroState {
            x: 1.5,
            y: -2.5,
            z: 0.25,
        };
        assert!(store.set_object(&gyro).unwrap());
        let back: GyroState = store.get_object().unwrap();
        assert_eq!(back.x, 1.5);
        assert_eq!(back.y, -2.5);
        assert_eq!(back.z, 0.25);
    }

    #[test]
    fn set_fires_event_only_on_change() {
        static QUEUE: Channel<CriticalSectionRawMutex, UpdateEvent, 8> = Channel::new();
        let mut store = store_with_gyro();
        store
            .subscribe(GyroState::ID, EventMask::UPDATED, QUEUE.dyn_sender())
            .unwrap();
        let gyro = GyroState {
            x: 1.0,
            y: 0.0,
            z: 0.0,
        };
        assert!(store.set_object(&gyro).unwrap());
        let ev = QUEUE.try_receive().unwrap();
        assert_eq!(ev.object, GyroState::ID);
        assert_eq!(ev.kind, EventKind::Updated);

        // Same value: no change, no event.
        assert!(!store.set_object(&gyro).unwrap());
        assert!(QUEUE.try_receive().is_err());
    }

    #[test]
    fn mask_filters_events() {
        static QUEUE: Channel<CriticalSectionRawMutex, UpdateEvent, 8> = Channel::new();
        let mut store = store_with_gyro();
        let sub = store
            .subscribe(GyroState::ID, EventMask::UPDATED_MANUAL, QUEUE.dyn_sender())
            .unwrap();
        let gyro = GyroState {
            x: 3.0,
            y: 0.0,
            z: 0.0,
        };
        store.set_object(&gyro).unwrap();
        assert!(QUEUE.try_receive().is_err(), "UPDATED not in mask");

        store.updated_manual(GyroState::ID, 0);
        assert_eq!(QUEUE.try_receive().unwrap().kind, EventKind::UpdatedManual);

        // Swap mask and confirm the old kind no longer passes.
        store.set_subscription_mask(sub, EventMask::UPDATE_REQ);
        store.updated_manual(GyroState::ID, 0);
        assert!(QUEUE.try_receive().is_err());
    }

    #[test]
    fn manual_logging_trigger_reaches_subscribers() {
        static QUEUE: Channel<CriticalSectionRawMutex, UpdateEvent, 8> = Channel::new();
        let mut store = store_with_gyro();
        store
            .subscribe(GyroState::ID, EventMask::LOGGING_MANUAL, QUEUE.dyn_sender())
            .unwrap();

        // Ordinary mutation is not a logging trigger.
        store
            .set_object(&GyroState {
                x: 2.0,
                y: 0.0,
                z: 0.0,
            })
            .unwrap();
        assert!(QUEUE.try_receive().is_err());

        store.logging_manual(GyroState::ID, 0);
        let ev = QUEUE.try_receive().unwrap();
        assert_eq!(ev.object, GyroState::ID);
        assert_eq!(ev.kind, EventKind::LoggingManual);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut store = store_with_gyro();
        assert_eq!(
            store.register::<GyroState>(Metadata::on_change()),
            Err(ObjectError::DuplicateObject)
        );
    }

    #[test]
    fn size_mismatch_rejected() {
        let mut store = store_with_gyro();
        let short = [0u8; 4];
        assert_eq!(
            store.set(GyroState::ID, 0, &short),
            Err(ObjectError::SizeMismatch)
        );
    }

    #[test]
    fn unknown_object_rejected() {
        let store = ObjectStore::new();
        let mut buf = [0u8; 8];
        assert_eq!(
            store.get(ObjectId(0xDEAD), 0, &mut buf),
            Err(ObjectError::UnknownObject)
        );
    }
}
