//! Telemetry engine: event dispatch, retries, and link fan-out
//!
//! The engine consumes [`UpdateEvent`]s from the priority and standard
//! queues and turns them into frame transmissions, log records, and object
//! requests according to each object's metadata policy.
//!
//! Transmission rules:
//! - Every outbound object goes to every attached link. Redundant links
//!   (radio plus USB) each carry the full object stream.
//! - Acked objects are retried up to [`MAX_RETRIES`] attempts, each waiting
//!   [`REQ_TIMEOUT_MS`](super::connection::REQ_TIMEOUT_MS) for the peer.
//!   Exhausted retries count as a transmit failure, never a panic.
//! - Object requests go out on the primary (first) link only.
//!
//! The stats tick event (object id NONE) drives the connection supervisor:
//! handshake advancement every tick, statistics rollup on its own period.

use embassy_sync::channel::DynamicSender;
use heapless::Vec;

use crate::objects::{
    logging_event, periodic_event, EventKind, InstanceId, Metadata, ObjectError, ObjectId,
    PeerLinkStats, LocalLinkStats, PeriodicDispatcher, SharedStore, StateObject, SubscriptionId,
    UpdateEvent, UpdateMode, ALL_INSTANCES, MAX_OBJECTS, MAX_OBJECT_SIZE,
};
use crate::{log_info, log_warn};

use super::connection::{Link, LinkError};
use super::frame::LinkStats;
use super::policy;
use super::supervisor::Supervisor;
use super::transport::Transport;

/// Transmit attempts for acked objects and object requests.
pub const MAX_RETRIES: u32 = 2;
/// Maximum simultaneously attached links.
pub const MAX_LINKS: usize = 2;
/// Cadence of the supervisor stats tick.
pub const STATS_TICK_MS: u32 = 1000;

/// Destination for the logging output path.
pub trait LogSink {
    fn log(&mut self, object: ObjectId, instance: InstanceId, payload: &[u8], now_ms: u64);
}

/// Sink that discards log records.
pub struct NullLog;

impl LogSink for NullLog {
    fn log(&mut self, _object: ObjectId, _instance: InstanceId, _payload: &[u8], _now_ms: u64) {}
}

struct Registration {
    object: ObjectId,
    sub: SubscriptionId,
    /// Throttled telemetry phase: hot after a change, cold after the tick.
    tel_hot: bool,
    log_hot: bool,
}

/// Event-driven telemetry engine for one endpoint.
pub struct TelemetryEngine<'l, T: Transport, L: LogSink> {
    links: Vec<&'l Link<T>, MAX_LINKS>,
    registrations: Vec<Registration, MAX_OBJECTS>,
    dispatcher: PeriodicDispatcher,
    supervisor: Supervisor,
    pending_stats: LinkStats,
    sink: L,
}

impl<'l, T: Transport, L: LogSink> TelemetryEngine<'l, T, L> {
    pub fn new(sink: L) -> Self {
        Self {
            links: Vec::new(),
            registrations: Vec::new(),
            dispatcher: PeriodicDispatcher::new(),
            supervisor: Supervisor::new(),
            pending_stats: LinkStats::default(),
            sink,
        }
    }

    /// Attach a link. The first link attached is the primary one, used for
    /// outbound object requests.
    pub fn add_link(&mut self, link: &'l Link<T>) -> Result<(), ()> {
        self.links.push(link).map_err(|_| ())
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Subscribe to every registered object, route each to the priority or
    /// standard queue per its metadata, and arm the periodic timers.
    pub fn register_all(
        &mut self,
        store: &SharedStore,
        priority_tx: DynamicSender<'static, UpdateEvent>,
        standard_tx: DynamicSender<'static, UpdateEvent>,
        now_ms: u64,
    ) -> Result<(), ObjectError> {
        let mut objects: Vec<(ObjectId, Metadata), MAX_OBJECTS> = Vec::new();
        store.with(|s| {
            s.iterate(|id, meta| {
                let _ = objects.push((id, *meta));
            })
        });

        for (id, meta) in &objects {
            let mask = policy::telemetry_mask(meta, false) | policy::logging_mask(meta, false);
            let sender = if meta.priority {
                priority_tx.clone()
            } else {
                standard_tx.clone()
            };
            let sub = store.with_mut(|s| s.subscribe(*id, mask, sender))?;
            self.registrations
                .push(Registration {
                    object: *id,
                    sub,
                    tel_hot: false,
                    log_hot: false,
                })
                .map_err(|_| ObjectError::TableFull)?;
            self.arm_timers(*id, meta, now_ms);
        }

        self.dispatcher
            .update_or_create(UpdateEvent::stats_tick(), STATS_TICK_MS, now_ms)
            .map_err(|_| ObjectError::TableFull)?;
        log_info!("telemetry engine registered {} objects", objects.len());
        Ok(())
    }

    fn arm_timers(&mut self, object: ObjectId, meta: &Metadata, now_ms: u64) {
        let tel = policy::telemetry_period(meta);
        let log = policy::logging_period(meta);
        if tel > 0 {
            let _ = self.dispatcher.update_or_create(periodic_event(object), tel, now_ms);
        }
        if log > 0 {
            let _ = self.dispatcher.update_or_create(logging_event(object), log, now_ms);
        }
    }

    /// Re-read an object's metadata and rebuild its subscription mask and
    /// timers. Call after `set_metadata`.
    pub fn refresh_object(&mut self, store: &SharedStore, object: ObjectId, now_ms: u64) {
        let Some(idx) = self.registrations.iter().position(|r| r.object == object) else {
            return;
        };
        let Ok(meta) = store.with(|s| s.metadata(object)) else {
            return;
        };
        self.registrations[idx].tel_hot = false;
        self.registrations[idx].log_hot = false;
        self.remask(store, idx, &meta);
        let _ = self
            .dispatcher
            .update_or_create(periodic_event(object), policy::telemetry_period(&meta), now_ms);
        let _ = self
            .dispatcher
            .update_or_create(logging_event(object), policy::logging_period(&meta), now_ms);
    }

    fn remask(&self, store: &SharedStore, idx: usize, meta: &Metadata) {
        let reg = &self.registrations[idx];
        let mask =
            policy::telemetry_mask(meta, reg.tel_hot) | policy::logging_mask(meta, reg.log_hot);
        store.with_mut(|s| s.set_subscription_mask(reg.sub, mask));
    }

    /// Pump the periodic timers, queueing due events via `emit`.
    pub fn pump_periodic(&mut self, now_ms: u64, emit: impl FnMut(UpdateEvent)) {
        self.dispatcher.process_due(now_ms, emit);
    }

    /// Milliseconds until the next periodic event is due.
    pub fn time_to_next_ms(&self, now_ms: u64) -> Option<u64> {
        self.dispatcher.time_to_next_ms(now_ms)
    }

    /// Dispatch one event from the queues.
    pub async fn process_event(&mut self, store: &SharedStore, ev: UpdateEvent, now_ms: u64) {
        if ev.object == ObjectId::NONE {
            self.stats_tick(store, now_ms);
            return;
        }

        // Inbound peer status doubles as connection liveness evidence.
        if ev.object == PeerLinkStats::ID && ev.kind == EventKind::Updated {
            self.supervisor.note_rx(now_ms);
            if self.supervisor.update_handshake(store, now_ms) {
                store.with_mut(|s| s.updated_manual(LocalLinkStats::ID, 0));
            }
        }

        let Some(idx) = self.registrations.iter().position(|r| r.object == ev.object) else {
            return;
        };
        let Ok(meta) = store.with(|s| s.metadata(ev.object)) else {
            return;
        };

        if ev.kind == EventKind::UpdateRequest {
            self.request_object(store, ev.object, ev.instance).await;
            return;
        }

        let wants_tx = policy::telemetry_mask(&meta, self.registrations[idx].tel_hot)
            .intersects(ev.kind.mask());
        let wants_log =
            policy::logging_mask(&meta, self.registrations[idx].log_hot).intersects(ev.kind.mask());

        if wants_tx {
            self.send_event(store, ev.object, ev.instance, meta.telemetry_acked)
                .await;
            if meta.telemetry_mode == UpdateMode::Throttled {
                let hot = ev.kind == EventKind::Updated;
                if self.registrations[idx].tel_hot != hot {
                    self.registrations[idx].tel_hot = hot;
                    self.remask(store, idx, &meta);
                }
            }
        }
        if wants_log {
            self.log_event(store, ev.object, ev.instance, now_ms);
            if meta.logging_mode == UpdateMode::Throttled {
                let hot = ev.kind == EventKind::Updated;
                if self.registrations[idx].log_hot != hot {
                    self.registrations[idx].log_hot = hot;
                    self.remask(store, idx, &meta);
                }
            }
        }
    }

    async fn send_event(
        &mut self,
        store: &SharedStore,
        object: ObjectId,
        instance: InstanceId,
        acked: bool,
    ) {
        if instance == ALL_INSTANCES {
            let count = store.with(|s| s.num_instances(object)).unwrap_or(1);
            for inst in 0..count {
                self.send_single(store, object, inst as InstanceId, acked).await;
            }
        } else {
            self.send_single(store, object, instance, acked).await;
        }
    }

    async fn send_single(
        &mut self,
        store: &SharedStore,
        object: ObjectId,
        instance: InstanceId,
        acked: bool,
    ) {
        for i in 0..self.links.len() {
            let link = self.links[i];
            let mut attempts = 0u32;
            loop {
                attempts += 1;
                match link.send_object(store, object, instance, acked).await {
                    Ok(()) => break,
                    Err(LinkError::Object(_)) => {
                        // Lookup failures will not improve on retry.
                        self.supervisor.note_tx_failure();
                        break;
                    }
                    Err(_) if attempts >= MAX_RETRIES => {
                        self.supervisor.note_tx_failure();
                        log_warn!("tx failed for object {} after {} attempts", object.0, attempts);
                        break;
                    }
                    Err(_) => self.supervisor.note_retry(),
                }
            }
        }
    }

    async fn request_object(&mut self, store: &SharedStore, object: ObjectId, instance: InstanceId) {
        let Some(&link) = self.links.first() else {
            return;
        };
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match link.send_object_request(store, object, instance).await {
                Ok(()) => break,
                Err(_) if attempts >= MAX_RETRIES => {
                    self.supervisor.note_tx_failure();
                    log_warn!("request failed for object {} after {} attempts", object.0, attempts);
                    break;
                }
                Err(_) => self.supervisor.note_retry(),
            }
        }
    }

    fn log_event(&mut self, store: &SharedStore, object: ObjectId, instance: InstanceId, now_ms: u64) {
        let mut payload = [0u8; MAX_OBJECT_SIZE];
        if instance == ALL_INSTANCES {
            let count = store.with(|s| s.num_instances(object)).unwrap_or(1);
            for inst in 0..count {
                if let Ok(n) = store.with(|s| s.get(object, inst as InstanceId, &mut payload)) {
                    self.sink.log(object, inst as InstanceId, &payload[..n], now_ms);
                }
            }
        } else if let Ok(n) = store.with(|s| s.get(object, instance, &mut payload)) {
            self.sink.log(object, instance, &payload[..n], now_ms);
        }
    }

    fn stats_tick(&mut self, store: &SharedStore, now_ms: u64) {
        let mut delta = LinkStats::default();
        for link in &self.links {
            delta.absorb(link.take_stats());
        }
        if delta.rx_objects > 0 {
            self.supervisor.note_rx(now_ms);
        }
        self.pending_stats.absorb(delta);

        let mut force = self.supervisor.update_handshake(store, now_ms);
        if self.supervisor.rollup_due(now_ms) {
            let period = self.pending_stats.take();
            self.supervisor.rollup(store, period, now_ms);
            force = true;
        }
        if force {
            store.with_mut(|s| s.updated_manual(LocalLinkStats::ID, 0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::objlink::parser::{ParseStatus, Parser};
    use crate::communication::objlink::transport::{ChannelTransport, CHANNEL_DEPTH};
    use crate::objects::{GyroState, ObjectStore, UpdateEvent};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::channel::Channel;
    use embassy_time::with_timeout;

    type EventQueue = Channel<CriticalSectionRawMutex, UpdateEvent, 32>;

    struct VecLog(std::vec::Vec<(ObjectId, InstanceId)>);

    impl LogSink for VecLog {
        fn log(&mut self, object: ObjectId, instance: InstanceId, _payload: &[u8], _now_ms: u64) {
            self.0.push((object, instance));
        }
    }

    fn peer_frame_count(bytes: &[u8], store: &ObjectStore) -> usize {
        let mut parser = Parser::new();
        let mut count = 0;
        for &b in bytes {
            if let ParseStatus::Complete(_) = parser.process_byte(b, store) {
                count += 1;
            }
        }
        count
    }

    async fn drain_bytes(t: &ChannelTransport) -> std::vec::Vec<u8> {
        use crate::communication::objlink::transport::Transport;
        let mut out = std::vec::Vec::new();
        let mut buf = [0u8; 128];
        loop {
            match with_timeout(embassy_time::Duration::from_millis(1), t.read(&mut buf)).await {
                Ok(Ok(n)) => out.extend_from_slice(&buf[..n]),
                _ => break,
            }
        }
        out
    }

    async fn drain_events(
        engine: &mut TelemetryEngine<'_, ChannelTransport, VecLog>,
        store: &SharedStore,
        queue: &'static EventQueue,
        now_ms: u64,
    ) {
        while let Ok(ev) = queue.try_receive() {
            engine.process_event(store, ev, now_ms).await;
        }
    }

    fn make_store(meta: Metadata) -> SharedStore {
        let mut store = ObjectStore::new();
        store.register::<GyroState>(meta).unwrap();
        SharedStore::new(store)
    }

    #[test]
    fn throttled_caps_burst_to_one_per_period() {
        static A_TO_B: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
        static B_TO_A: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
        static PRIO: EventQueue = Channel::new();
        static STD: EventQueue = Channel::new();

        let (a, b) = ChannelTransport::pair(&A_TO_B, &B_TO_A);
        let link = Link::new(a);
        let store = make_store(Metadata::throttled(100));
        let mut peer_model = ObjectStore::new();
        peer_model
            .register::<GyroState>(Metadata::throttled(100))
            .unwrap();

        let mut engine = TelemetryEngine::new(VecLog(std::vec::Vec::new()));
        engine.add_link(&link).unwrap();
        engine
            .register_all(&store, PRIO.dyn_sender(), STD.dyn_sender(), 0)
            .unwrap();

        block_on(async {
            // First change: sent immediately, phase flips hot.
            store.with_mut(|s| {
                s.set_object(&GyroState {
                    x: 1.0,
                    y: 0.0,
                    z: 0.0,
                })
                .unwrap()
            });
            drain_events(&mut engine, &store, &STD, 0).await;
            let bytes = drain_bytes(&b).await;
            assert_eq!(peer_frame_count(&bytes, &peer_model), 1);

            // Burst of further changes while hot: masked out at the store.
            for i in 2..6 {
                store.with_mut(|s| {
                    s.set_object(&GyroState {
                        x: i as f32,
                        y: 0.0,
                        z: 0.0,
                    })
                    .unwrap()
                });
            }
            drain_events(&mut engine, &store, &STD, 50).await;
            let bytes = drain_bytes(&b).await;
            assert_eq!(peer_frame_count(&bytes, &peer_model), 0);

            // Periodic tick while hot: exactly one send, phase reverts.
            engine.pump_periodic(100, |ev| {
                let _ = STD.try_send(ev);
            });
            drain_events(&mut engine, &store, &STD, 100).await;
            let bytes = drain_bytes(&b).await;
            assert_eq!(peer_frame_count(&bytes, &peer_model), 1);

            // Cold periodic tick with no change: silent.
            engine.pump_periodic(200, |ev| {
                let _ = STD.try_send(ev);
            });
            drain_events(&mut engine, &store, &STD, 200).await;
            let bytes = drain_bytes(&b).await;
            assert_eq!(peer_frame_count(&bytes, &peer_model), 0);
        });
    }

    #[test]
    fn periodic_object_sends_on_each_tick() {
        static A_TO_B: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
        static B_TO_A: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
        static PRIO: EventQueue = Channel::new();
        static STD: EventQueue = Channel::new();

        let (a, b) = ChannelTransport::pair(&A_TO_B, &B_TO_A);
        let link = Link::new(a);
        let store = make_store(Metadata::periodic(100));
        let mut peer_model = ObjectStore::new();
        peer_model
            .register::<GyroState>(Metadata::periodic(100))
            .unwrap();

        let mut engine = TelemetryEngine::new(VecLog(std::vec::Vec::new()));
        engine.add_link(&link).unwrap();
        engine
            .register_all(&store, PRIO.dyn_sender(), STD.dyn_sender(), 0)
            .unwrap();

        block_on(async {
            // A value change alone does not transmit in periodic mode.
            store.with_mut(|s| {
                s.set_object(&GyroState {
                    x: 1.0,
                    y: 2.0,
                    z: 3.0,
                })
                .unwrap()
            });
            drain_events(&mut engine, &store, &STD, 10).await;
            let bytes = drain_bytes(&b).await;
            assert_eq!(peer_frame_count(&bytes, &peer_model), 0);

            for tick in 1..=3u64 {
                engine.pump_periodic(tick * 100, |ev| {
                    let _ = STD.try_send(ev);
                });
                drain_events(&mut engine, &store, &STD, tick * 100).await;
            }
            let bytes = drain_bytes(&b).await;
            assert_eq!(peer_frame_count(&bytes, &peer_model), 3);
        });
    }

    #[test]
    fn logging_path_feeds_the_sink() {
        static A_TO_B: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
        static B_TO_A: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
        static PRIO: EventQueue = Channel::new();
        static STD: EventQueue = Channel::new();

        let (a, _b) = ChannelTransport::pair(&A_TO_B, &B_TO_A);
        let link = Link::new(a);
        let meta = Metadata::on_change().with_logging(UpdateMode::Periodic, 50);
        let store = make_store(meta);

        let mut engine = TelemetryEngine::new(VecLog(std::vec::Vec::new()));
        engine.add_link(&link).unwrap();
        engine
            .register_all(&store, PRIO.dyn_sender(), STD.dyn_sender(), 0)
            .unwrap();

        block_on(async {
            engine.pump_periodic(50, |ev| {
                let _ = STD.try_send(ev);
            });
            engine.pump_periodic(100, |ev| {
                let _ = STD.try_send(ev);
            });
            drain_events(&mut engine, &store, &STD, 100).await;
        });
        assert_eq!(engine.sink.0.len(), 2);
        assert_eq!(engine.sink.0[0].0, GyroState::ID);
    }

    #[test]
    fn acked_send_without_peer_counts_a_failure() {
        static A_TO_B: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
        static B_TO_A: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
        static PRIO: EventQueue = Channel::new();
        static STD: EventQueue = Channel::new();

        let (a, b) = ChannelTransport::pair(&A_TO_B, &B_TO_A);
        let link = Link::new(a);
        let store = make_store(Metadata::on_change().with_ack().with_priority());
        let mut peer_model = ObjectStore::new();
        peer_model
            .register::<GyroState>(Metadata::on_change())
            .unwrap();

        let mut engine: TelemetryEngine<'_, ChannelTransport, NullLog> =
            TelemetryEngine::new(NullLog);
        engine.add_link(&link).unwrap();
        engine
            .register_all(&store, PRIO.dyn_sender(), STD.dyn_sender(), 0)
            .unwrap();

        block_on(async {
            store.with_mut(|s| {
                s.set_object(&GyroState {
                    x: 9.0,
                    y: 9.0,
                    z: 9.0,
                })
                .unwrap()
            });
            while let Ok(ev) = PRIO.try_receive() {
                engine.process_event(&store, ev, 0).await;
            }
        });

        // Both attempts hit the wire, then the engine gave up.
        let bytes = block_on(drain_bytes(&b));
        assert_eq!(peer_frame_count(&bytes, &peer_model), MAX_RETRIES as usize);
    }
}
