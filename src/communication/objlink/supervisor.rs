//! Link supervision: handshake and statistics rollup
//!
//! The supervisor owns the connection state machine published in
//! [`LocalLinkStats`]. The peer drives the handshake by writing its own
//! status into [`PeerLinkStats`]:
//!
//! Disconnected --peer HandshakeReq--> HandshakeAck
//! HandshakeAck --peer Connected-----> Connected
//! Connected ---peer leaves / rx silence---> Disconnected
//!
//! Every [`STATS_PERIOD_MS`] the supervisor folds the accumulated link
//! statistics into `LocalLinkStats` and force-transmits it. While not
//! connected the counters are zeroed so a fresh session starts clean.

use crate::log_info;
use crate::objects::{LinkStatus, LocalLinkStats, PeerLinkStats, SharedStore};

use super::frame::LinkStats;

/// Statistics rollup interval.
pub const STATS_PERIOD_MS: u64 = 4000;
/// Declare the link dead after this much receive silence.
pub const CONNECTION_TIMEOUT_MS: u64 = 8000;

/// Connection state machine plus stats accounting for one telemetry
/// session.
pub struct Supervisor {
    status: LinkStatus,
    /// Retries and failures reported by the engine since the last rollup.
    tx_retries: u32,
    tx_failures: u32,
    rx_failures: u32,
    last_rx_ms: u64,
    last_rollup_ms: u64,
}

impl Supervisor {
    pub const fn new() -> Self {
        Self {
            status: LinkStatus::Disconnected,
            tx_retries: 0,
            tx_failures: 0,
            rx_failures: 0,
            last_rx_ms: 0,
            last_rollup_ms: 0,
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn connected(&self) -> bool {
        self.status == LinkStatus::Connected
    }

    /// Record an inbound object so the silence timeout can be tracked.
    pub fn note_rx(&mut self, now_ms: u64) {
        self.last_rx_ms = now_ms;
    }

    /// Record a transmit retry.
    pub fn note_retry(&mut self) {
        self.tx_retries = self.tx_retries.wrapping_add(1);
    }

    /// Record a transmit that exhausted its retries.
    pub fn note_tx_failure(&mut self) {
        self.tx_failures = self.tx_failures.wrapping_add(1);
    }

    /// Record an inbound frame the link layer rejected.
    pub fn note_rx_failure(&mut self) {
        self.rx_failures = self.rx_failures.wrapping_add(1);
    }

    /// Advance the handshake from the peer's published status. Returns true
    /// when our status changed, in which case the caller must force-send
    /// `LocalLinkStats`.
    pub fn update_handshake(&mut self, store: &SharedStore, now_ms: u64) -> bool {
        let peer: PeerLinkStats = match store.with(|s| s.get_object()) {
            Ok(p) => p,
            Err(_) => return false,
        };

        let next = match self.status {
            LinkStatus::Disconnected => {
                if peer.status == LinkStatus::HandshakeReq {
                    LinkStatus::HandshakeAck
                } else {
                    LinkStatus::Disconnected
                }
            }
            LinkStatus::HandshakeAck => match peer.status {
                LinkStatus::Connected => LinkStatus::Connected,
                LinkStatus::HandshakeReq => LinkStatus::HandshakeAck,
                _ => LinkStatus::Disconnected,
            },
            LinkStatus::Connected => {
                let silent = now_ms.saturating_sub(self.last_rx_ms) >= CONNECTION_TIMEOUT_MS;
                if silent || peer.status == LinkStatus::Disconnected {
                    LinkStatus::Disconnected
                } else if peer.status == LinkStatus::HandshakeReq {
                    // Peer restarted its side of the handshake.
                    LinkStatus::HandshakeAck
                } else {
                    LinkStatus::Connected
                }
            }
            // HandshakeReq is a peer-side state, never ours.
            LinkStatus::HandshakeReq => LinkStatus::Disconnected,
        };

        if next == self.status {
            return false;
        }
        log_info!("link status {} -> {}", self.status as u8, next as u8);
        self.status = next;
        self.publish(store, LinkStats::default(), 0);
        true
    }

    /// Whether a stats rollup is due.
    pub fn rollup_due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_rollup_ms) >= STATS_PERIOD_MS
    }

    /// Fold `period_stats` into `LocalLinkStats` and reset local counters.
    /// The caller force-sends the object afterwards.
    pub fn rollup(&mut self, store: &SharedStore, period_stats: LinkStats, now_ms: u64) {
        let elapsed_ms = now_ms.saturating_sub(self.last_rollup_ms).max(1);
        self.last_rollup_ms = now_ms;
        self.publish(store, period_stats, elapsed_ms);
        self.tx_retries = 0;
        self.tx_failures = 0;
        self.rx_failures = 0;
    }

    fn publish(&self, store: &SharedStore, period_stats: LinkStats, elapsed_ms: u64) {
        let mut local: LocalLinkStats =
            store.with(|s| s.get_object()).unwrap_or_default();
        local.status = self.status;

        if self.connected() {
            let scale = if elapsed_ms > 0 {
                1000.0 / elapsed_ms as f32
            } else {
                0.0
            };
            local.tx_data_rate = period_stats.tx_bytes as f32 * scale;
            local.rx_data_rate = period_stats.rx_bytes as f32 * scale;
            local.tx_bytes = local.tx_bytes.wrapping_add(period_stats.tx_bytes);
            local.rx_bytes = local.rx_bytes.wrapping_add(period_stats.rx_bytes);
            local.tx_retries = local.tx_retries.wrapping_add(self.tx_retries);
            local.tx_failures = local.tx_failures.wrapping_add(self.tx_failures);
            local.rx_failures = local
                .rx_failures
                .wrapping_add(self.rx_failures)
                .wrapping_add(period_stats.rx_errors);
            local.rx_sync_errors = local.rx_sync_errors.wrapping_add(period_stats.rx_sync_errors);
            local.rx_crc_errors = local.rx_crc_errors.wrapping_add(period_stats.rx_crc_errors);
        } else {
            // Stale counters from a previous session are meaningless.
            local = LocalLinkStats {
                status: self.status,
                ..LocalLinkStats::default()
            };
        }

        let _ = store.with_mut(|s| s.set_object(&local));
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Metadata, ObjectStore};

    fn shared_store() -> SharedStore {
        let mut store = ObjectStore::new();
        store
            .register::<LocalLinkStats>(Metadata::periodic(4000))
            .unwrap();
        store
            .register::<PeerLinkStats>(Metadata::periodic(4000))
            .unwrap();
        SharedStore::new(store)
    }

    fn set_peer_status(store: &SharedStore, status: LinkStatus) {
        store.with_mut(|s| {
            let mut peer: PeerLinkStats = s.get_object().unwrap();
            peer.status = status;
            s.set_object(&peer).unwrap();
        });
    }

    #[test]
    fn full_handshake_sequence() {
        let store = shared_store();
        let mut sup = Supervisor::new();
        assert_eq!(sup.status(), LinkStatus::Disconnected);

        // No handshake request yet: stay down.
        assert!(!sup.update_handshake(&store, 100));

        set_peer_status(&store, LinkStatus::HandshakeReq);
        assert!(sup.update_handshake(&store, 200));
        assert_eq!(sup.status(), LinkStatus::HandshakeAck);

        set_peer_status(&store, LinkStatus::Connected);
        sup.note_rx(300);
        assert!(sup.update_handshake(&store, 300));
        assert_eq!(sup.status(), LinkStatus::Connected);

        let local: LocalLinkStats = store.with(|s| s.get_object().unwrap());
        assert_eq!(local.status, LinkStatus::Connected);
    }

    #[test]
    fn rx_silence_drops_the_link() {
        let store = shared_store();
        let mut sup = Supervisor::new();
        set_peer_status(&store, LinkStatus::HandshakeReq);
        sup.update_handshake(&store, 0);
        set_peer_status(&store, LinkStatus::Connected);
        sup.note_rx(1000);
        sup.update_handshake(&store, 1000);
        assert!(sup.connected());

        // Quiet for less than the timeout: still up.
        assert!(!sup.update_handshake(&store, 1000 + CONNECTION_TIMEOUT_MS - 1));
        assert!(sup.connected());

        // Timeout reached: down.
        assert!(sup.update_handshake(&store, 1000 + CONNECTION_TIMEOUT_MS));
        assert_eq!(sup.status(), LinkStatus::Disconnected);
    }

    #[test]
    fn rollup_zeroes_stats_while_disconnected() {
        let store = shared_store();
        let mut sup = Supervisor::new();

        // Seed nonzero counters as if from a previous session.
        store.with_mut(|s| {
            s.set_object(&LocalLinkStats {
                tx_bytes: 999,
                rx_bytes: 888,
                ..LocalLinkStats::default()
            })
            .unwrap();
        });

        let period = LinkStats {
            tx_bytes: 100,
            rx_bytes: 50,
            ..LinkStats::default()
        };
        sup.rollup(&store, period, STATS_PERIOD_MS);

        let local: LocalLinkStats = store.with(|s| s.get_object().unwrap());
        assert_eq!(local.status, LinkStatus::Disconnected);
        assert_eq!(local.tx_bytes, 0);
        assert_eq!(local.rx_bytes, 0);
        assert_eq!(local.tx_data_rate, 0.0);
    }

    #[test]
    fn rollup_accumulates_while_connected() {
        let store = shared_store();
        let mut sup = Supervisor::new();
        set_peer_status(&store, LinkStatus::HandshakeReq);
        sup.update_handshake(&store, 0);
        set_peer_status(&store, LinkStatus::Connected);
        sup.note_rx(10);
        sup.update_handshake(&store, 10);

        let period = LinkStats {
            tx_bytes: 4000,
            rx_bytes: 2000,
            ..LinkStats::default()
        };
        sup.note_retry();
        sup.rollup(&store, period, STATS_PERIOD_MS);

        let local: LocalLinkStats = store.with(|s| s.get_object().unwrap());
        assert_eq!(local.tx_bytes, 4000);
        assert_eq!(local.rx_bytes, 2000);
        assert_eq!(local.tx_retries, 1);
        // 4000 bytes over 4 s is 1000 B/s.
        assert!((local.tx_data_rate - 1000.0).abs() < 2.0);
    }

    #[test]
    fn rollup_cadence() {
        let sup = Supervisor::new();
        assert!(sup.rollup_due(STATS_PERIOD_MS));
        assert!(!sup.rollup_due(STATS_PERIOD_MS - 1));
    }
}
