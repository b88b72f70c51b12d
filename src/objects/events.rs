//! Periodic event generation
//!
//! Objects in periodic (or throttled) telemetry/logging modes need a timer
//! tick per object. The dispatcher keeps one entry per (object, event kind)
//! and emits the stored event into the telemetry queues whenever its period
//! elapses. A period of zero disables the entry without removing it.

use heapless::Vec;

use super::types::{EventKind, ObjectId, UpdateEvent};

const MAX_PERIODIC: usize = 24;

struct PeriodicEntry {
    event: UpdateEvent,
    period_ms: u32,
    last_fired_ms: u64,
}

/// Fixed-table periodic event source.
pub struct PeriodicDispatcher {
    entries: Vec<PeriodicEntry, MAX_PERIODIC>,
}

impl PeriodicDispatcher {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Create or retune the periodic entry matching `event`'s object and
    /// kind. `period_ms == 0` disables it.
    pub fn update_or_create(
        &mut self,
        event: UpdateEvent,
        period_ms: u32,
        now_ms: u64,
    ) -> Result<(), ()> {
        for entry in self.entries.iter_mut() {
            if entry.event.object == event.object && entry.event.kind == event.kind {
                entry.period_ms = period_ms;
                entry.last_fired_ms = now_ms;
                return Ok(());
            }
        }
        self.entries
            .push(PeriodicEntry {
                event,
                period_ms,
                last_fired_ms: now_ms,
            })
            .map_err(|_| ())
    }

    /// Emit every due event via `emit` and rearm it.
    pub fn process_due(&mut self, now_ms: u64, mut emit: impl FnMut(UpdateEvent)) {
        for entry in self.entries.iter_mut() {
            if entry.period_ms == 0 {
                continue;
            }
            if now_ms.saturating_sub(entry.last_fired_ms) >= u64::from(entry.period_ms) {
                entry.last_fired_ms = now_ms;
                emit(entry.event);
            }
        }
    }

    /// Milliseconds until the next due entry, if any entry is armed.
    pub fn time_to_next_ms(&self, now_ms: u64) -> Option<u64> {
        self.entries
            .iter()
            .filter(|e| e.period_ms > 0)
            .map(|e| {
                let due = e.last_fired_ms + u64::from(e.period_ms);
                due.saturating_sub(now_ms)
            })
            .min()
    }
}

impl Default for PeriodicDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the periodic telemetry event for an object.
pub fn periodic_event(object: ObjectId) -> UpdateEvent {
    UpdateEvent {
        object,
        instance: super::types::ALL_INSTANCES,
        kind: EventKind::UpdatedPeriodic,
    }
}

/// Build the periodic logging event for an object.
pub fn logging_event(object: ObjectId) -> UpdateEvent {
    UpdateEvent {
        object,
        instance: super::types::ALL_INSTANCES,
        kind: EventKind::LoggingPeriodic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(disp: &mut PeriodicDispatcher, now_ms: u64) -> std::vec::Vec<UpdateEvent> {
        let mut out = std::vec::Vec::new();
        disp.process_due(now_ms, |ev| out.push(ev));
        out
    }

    #[test]
    fn fires_at_period() {
        let mut disp = PeriodicDispatcher::new();
        disp.update_or_create(periodic_event(ObjectId(7)), 100, 0)
            .unwrap();

        assert!(collect(&mut disp, 50).is_empty());
        let fired = collect(&mut disp, 100);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].object, ObjectId(7));
        // Rearmed relative to the fire time.
        assert!(collect(&mut disp, 150).is_empty());
        assert_eq!(collect(&mut disp, 200).len(), 1);
    }

    #[test]
    fn zero_period_disables() {
        let mut disp = PeriodicDispatcher::new();
        disp.update_or_create(periodic_event(ObjectId(7)), 100, 0)
            .unwrap();
        disp.update_or_create(periodic_event(ObjectId(7)), 0, 0)
            .unwrap();
        assert!(collect(&mut disp, 10_000).is_empty());
    }

    #[test]
    fn retune_replaces_existing_entry() {
        let mut disp = PeriodicDispatcher::new();
        disp.update_or_create(periodic_event(ObjectId(7)), 100, 0)
            .unwrap();
        disp.update_or_create(periodic_event(ObjectId(7)), 500, 0)
            .unwrap();
        assert!(collect(&mut disp, 100).is_empty());
        assert_eq!(collect(&mut disp, 500).len(), 1);
    }

    #[test]
    fn telemetry_and_logging_entries_are_independent() {
        let mut disp = PeriodicDispatcher::new();
        disp.update_or_create(periodic_event(ObjectId(7)), 100, 0)
            .unwrap();
        disp.update_or_create(logging_event(ObjectId(7)), 250, 0)
            .unwrap();
        let fired = collect(&mut disp, 250);
        assert_eq!(fired.len(), 2);
    }

    #[test]
    fn time_to_next_tracks_earliest() {
        let mut disp = PeriodicDispatcher::new();
        assert_eq!(disp.time_to_next_ms(0), None);
        disp.update_or_create(periodic_event(ObjectId(1)), 400, 0)
            .unwrap();
        disp.update_or_create(periodic_event(ObjectId(2)), 100, 0)
            .unwrap();
        assert_eq!(disp.time_to_next_ms(30), Some(70));
    }
}
