//! Shared-state cell for cross-task state
//!
//! Wraps a value in a critical-section blocking mutex so that a single
//! writer task and any number of reader tasks observe atomic snapshots,
//! never a partially written value. Access is closure-scoped; the lock is
//! never held across an await point.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

/// Critical-section protected state cell.
///
/// `const`-constructible so cells can live in statics and be shared between
/// tasks by reference.
///
/// # Example
///
/// ```ignore
/// static STORE: StateCell<ObjectStore> = StateCell::new(ObjectStore::new());
///
/// STORE.with_mut(|s| s.set_object(&attitude));
/// let status: FlightStatus = STORE.with(|s| s.get_object())?;
/// ```
pub struct StateCell<T> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<T>>,
}

impl<T> StateCell<T> {
    /// Create a new cell wrapping `value`.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Access the state immutably.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.inner.lock(|cell| f(&cell.borrow()))
    }

    /// Access the state mutably.
    pub fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}
