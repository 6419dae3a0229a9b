//! Connection registry state.
//!
//! `RegistryState` holds the canonical connection map, the subscription
//! map, and the id of the most recent heartbeat. It is plain data: the
//! [`Hub`](crate::Hub) wraps it in a single `parking_lot::Mutex` and every
//! method here runs under that lock, so the two maps always change
//! together and nothing in this module awaits.
//!
//! Each entry carries a `serial` assigned at insertion. Work that snapshots
//! targets, releases the lock, and comes back later (fan-out, heartbeat
//! sweeps) uses the serial so a stale result never touches a newer
//! connection that re-registered under the same id.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::ids::{BoardId, ConnectionId};
use crate::subscriptions::BoardSubscriptions;
use crate::transport::Transport;

/// Why a connection left the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Explicit unregister (client closed the socket).
    Unregistered,
    /// A send to the client failed or timed out.
    SendFailed,
    /// Too many consecutive heartbeats went unanswered.
    MissedHeartbeats,
    /// No activity for longer than the inactivity timeout.
    Inactive,
    /// Another connection registered with the same id.
    Replaced,
    /// The hub is shutting down.
    Shutdown,
}

impl EvictionReason {
    /// Stable label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::SendFailed => "send_failed",
            Self::MissedHeartbeats => "missed_heartbeats",
            Self::Inactive => "inactive",
            Self::Replaced => "replaced",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of one connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    /// Connection id.
    pub connection_id: ConnectionId,
    /// Optional label supplied at registration.
    pub user_label: Option<String>,
    /// Wall-clock connect time.
    pub connected_at: DateTime<Utc>,
    /// Seconds since connect.
    pub connected_secs: u64,
    /// Seconds since last activity.
    pub idle_secs: u64,
    /// Application messages delivered.
    pub message_count: u64,
    /// Heartbeats answered.
    pub heartbeat_responses: u64,
    /// Consecutive heartbeats currently unanswered.
    pub missed_heartbeats: u32,
    /// Seconds since the last heartbeat was sent, if any.
    pub last_heartbeat_secs: Option<u64>,
    /// Subscribed boards; empty means every board.
    pub subscriptions: Vec<BoardId>,
}

/// Aggregate view over every live connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Live connections.
    pub total_connections: usize,
    /// Sum of `message_count` over live connections.
    pub total_messages_sent: u64,
    /// Per-connection details, oldest first.
    pub connections: Vec<ConnectionSnapshot>,
}

#[derive(Debug)]
pub(crate) struct ConnectionMeta {
    pub(crate) connected_at: DateTime<Utc>,
    pub(crate) connected_mono: Instant,
    pub(crate) last_activity: Instant,
    pub(crate) message_count: u64,
    pub(crate) user_label: Option<String>,
    pub(crate) last_heartbeat: Option<Instant>,
    pub(crate) heartbeat_responses: u64,
    pub(crate) missed_heartbeats: u32,
}

impl ConnectionMeta {
    fn new(user_label: Option<String>, now: Instant) -> Self {
        Self {
            connected_at: Utc::now(),
            connected_mono: now,
            last_activity: now,
            message_count: 0,
            user_label,
            last_heartbeat: None,
            heartbeat_responses: 0,
            missed_heartbeats: 0,
        }
    }
}

pub(crate) struct ConnectionEntry {
    pub(crate) serial: u64,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) meta: ConnectionMeta,
}

/// A send target captured under the lock.
#[derive(Clone)]
pub(crate) struct Target {
    pub(crate) id: ConnectionId,
    pub(crate) serial: u64,
    pub(crate) transport: Arc<dyn Transport>,
}

#[derive(Default)]
pub(crate) struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    subscriptions: HashMap<ConnectionId, BoardSubscriptions>,
    current_heartbeat: Option<String>,
    next_serial: u64,
}

impl RegistryState {
    /// Insert a connection with an empty subscription set. Returns the
    /// entry previously registered under the same id, if any.
    pub(crate) fn insert(
        &mut self,
        id: ConnectionId,
        transport: Arc<dyn Transport>,
        user_label: Option<String>,
        now: Instant,
    ) -> Option<ConnectionEntry> {
        self.next_serial += 1;
        let entry = ConnectionEntry {
            serial: self.next_serial,
            transport,
            meta: ConnectionMeta::new(user_label, now),
        };
        let _ = self.subscriptions.insert(id.clone(), BoardSubscriptions::new());
        self.connections.insert(id, entry)
    }

    pub(crate) fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.connections.remove(id)?;
        let _ = self.subscriptions.remove(id);
        Some(entry)
    }

    /// Remove only if the entry is still the one captured with `serial`.
    pub(crate) fn remove_if_serial(
        &mut self,
        id: &ConnectionId,
        serial: u64,
    ) -> Option<ConnectionEntry> {
        if self.connections.get(id)?.serial != serial {
            return None;
        }
        self.remove(id)
    }

    /// Remove only if `id` is still bound to `transport`.
    pub(crate) fn remove_if_transport(
        &mut self,
        id: &ConnectionId,
        transport: &Weak<dyn Transport>,
    ) -> Option<ConnectionEntry> {
        let entry = self.connections.get(id)?;
        if !std::ptr::addr_eq(Arc::as_ptr(&entry.transport), transport.as_ptr()) {
            return None;
        }
        self.remove(id)
    }

    pub(crate) fn drain(&mut self) -> Vec<(ConnectionId, ConnectionEntry)> {
        self.subscriptions.clear();
        self.connections.drain().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    pub(crate) fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub(crate) fn touch(&mut self, id: &ConnectionId, now: Instant) -> bool {
        match self.connections.get_mut(id) {
            Some(entry) => {
                entry.meta.last_activity = now;
                true
            }
            None => false,
        }
    }

    pub(crate) fn record_activity(&mut self, id: &ConnectionId, now: Instant) -> bool {
        match self.connections.get_mut(id) {
            Some(entry) => {
                entry.meta.last_activity = now;
                entry.meta.message_count += 1;
                true
            }
            None => false,
        }
    }

    /// Record `messages` successful application sends per `(id, serial)`.
    pub(crate) fn record_sends(
        &mut self,
        delivered: &[(ConnectionId, u64)],
        messages: u64,
        now: Instant,
    ) {
        for (id, serial) in delivered {
            self.record_send(id, *serial, messages, now);
        }
    }

    /// Like `record_sends` with a per-connection message count.
    pub(crate) fn record_send_counts(&mut self, delivered: &[(ConnectionId, u64, u64)], now: Instant) {
        for (id, serial, messages) in delivered {
            self.record_send(id, *serial, *messages, now);
        }
    }

    fn record_send(&mut self, id: &ConnectionId, serial: u64, messages: u64, now: Instant) {
        if let Some(entry) = self.connections.get_mut(id) {
            if entry.serial == serial {
                entry.meta.last_activity = now;
                entry.meta.message_count += messages;
            }
        }
    }

    pub(crate) fn subscriptions(&self, id: &ConnectionId) -> Option<&BoardSubscriptions> {
        self.subscriptions.get(id)
    }

    pub(crate) fn subscriptions_mut(&mut self, id: &ConnectionId) -> Option<&mut BoardSubscriptions> {
        self.subscriptions.get_mut(id)
    }

    /// Snapshot send targets, optionally filtered to a board's audience.
    pub(crate) fn targets(
        &self,
        board: Option<BoardId>,
        exclude: &HashSet<ConnectionId>,
    ) -> Vec<Target> {
        self.connections
            .iter()
            .filter(|(id, _)| !exclude.contains(*id))
            .filter(|(id, _)| match board {
                Some(board) => self.subscriptions.get(*id).is_some_and(|s| s.matches(board)),
                None => true,
            })
            .map(|(id, entry)| Target {
                id: id.clone(),
                serial: entry.serial,
                transport: Arc::clone(&entry.transport),
            })
            .collect()
    }

    pub(crate) fn target(&self, id: &ConnectionId) -> Option<Target> {
        self.connections.get(id).map(|entry| Target {
            id: id.clone(),
            serial: entry.serial,
            transport: Arc::clone(&entry.transport),
        })
    }

    /// Issue a new heartbeat: remember its id and count it as missed for
    /// every connection until answered.
    pub(crate) fn begin_heartbeat(&mut self, heartbeat_id: String, now: Instant) {
        self.current_heartbeat = Some(heartbeat_id);
        for entry in self.connections.values_mut() {
            entry.meta.missed_heartbeats += 1;
            entry.meta.last_heartbeat = Some(now);
        }
    }

    pub(crate) fn current_heartbeat(&self) -> Option<&str> {
        self.current_heartbeat.as_deref()
    }

    /// Accept a response only for the most recently issued heartbeat.
    pub(crate) fn accept_heartbeat_response(
        &mut self,
        id: &ConnectionId,
        heartbeat_id: &str,
    ) -> bool {
        if self.current_heartbeat.as_deref() != Some(heartbeat_id) {
            return false;
        }
        match self.connections.get_mut(id) {
            Some(entry) => {
                entry.meta.missed_heartbeats = 0;
                entry.meta.heartbeat_responses += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn overdue(&self, threshold: u32) -> Vec<(ConnectionId, u64)> {
        self.connections
            .iter()
            .filter(|(_, entry)| entry.meta.missed_heartbeats >= threshold)
            .map(|(id, entry)| (id.clone(), entry.serial))
            .collect()
    }

    /// Connections idle for strictly longer than `timeout`.
    pub(crate) fn idle(&self, timeout: Duration, now: Instant) -> Vec<(ConnectionId, u64)> {
        self.connections
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.meta.last_activity) > timeout)
            .map(|(id, entry)| (id.clone(), entry.serial))
            .collect()
    }

    pub(crate) fn snapshot(&self, id: &ConnectionId, now: Instant) -> Option<ConnectionSnapshot> {
        let entry = self.connections.get(id)?;
        let meta = &entry.meta;
        Some(ConnectionSnapshot {
            connection_id: id.clone(),
            user_label: meta.user_label.clone(),
            connected_at: meta.connected_at,
            connected_secs: now.saturating_duration_since(meta.connected_mono).as_secs(),
            idle_secs: now.saturating_duration_since(meta.last_activity).as_secs(),
            message_count: meta.message_count,
            heartbeat_responses: meta.heartbeat_responses,
            missed_heartbeats: meta.missed_heartbeats,
            last_heartbeat_secs: meta
                .last_heartbeat
                .map(|at| now.saturating_duration_since(at).as_secs()),
            subscriptions: self
                .subscriptions
                .get(id)
                .map(BoardSubscriptions::sorted)
                .unwrap_or_default(),
        })
    }

    pub(crate) fn stats(&self, now: Instant) -> ConnectionStats {
        let mut ordered: Vec<(&ConnectionId, &ConnectionEntry)> = self.connections.iter().collect();
        ordered.sort_by(|a, b| {
            a.1.meta
                .connected_mono
                .cmp(&b.1.meta.connected_mono)
                .then_with(|| a.1.serial.cmp(&b.1.serial))
        });
        let connections: Vec<ConnectionSnapshot> = ordered
            .into_iter()
            .filter_map(|(id, _)| self.snapshot(id, now))
            .collect();
        ConnectionStats {
            total_connections: connections.len(),
            total_messages_sent: connections.iter().map(|c| c.message_count).sum(),
            connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;

    fn state_with(ids: &[&str]) -> RegistryState {
        let mut state = RegistryState::default();
        let now = Instant::now();
        for id in ids {
            let _ = state.insert((*id).into(), RecordingTransport::new(), None, now);
        }
        state
    }

    fn ids(targets: &[Target]) -> Vec<String> {
        let mut ids: Vec<String> = targets.iter().map(|t| t.id.to_string()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn insert_creates_subscription_set() {
        let state = state_with(&["a"]);
        assert!(state.contains(&"a".into()));
        assert!(state.subscriptions(&"a".into()).unwrap().is_empty());
    }

    #[test]
    fn remove_drops_both_maps() {
        let mut state = state_with(&["a"]);
        assert!(state.remove(&"a".into()).is_some());
        assert!(!state.contains(&"a".into()));
        assert!(state.subscriptions(&"a".into()).is_none());
        assert!(state.remove(&"a".into()).is_none());
    }

    #[test]
    fn reinsert_returns_previous_entry_with_older_serial() {
        let mut state = state_with(&["a"]);
        let first = state.target(&"a".into()).unwrap().serial;
        let old = state
            .insert("a".into(), RecordingTransport::new(), None, Instant::now())
            .unwrap();
        assert_eq!(old.serial, first);
        assert!(state.target(&"a".into()).unwrap().serial > first);
    }

    #[test]
    fn stale_serial_does_not_remove_new_entry() {
        let mut state = state_with(&["a"]);
        let stale = state.target(&"a".into()).unwrap().serial;
        let _ = state.insert("a".into(), RecordingTransport::new(), None, Instant::now());
        assert!(state.remove_if_serial(&"a".into(), stale).is_none());
        assert!(state.contains(&"a".into()));
    }

    #[test]
    fn remove_if_transport_matches_identity() {
        let mut state = RegistryState::default();
        let first: Arc<dyn Transport> = RecordingTransport::new();
        let first_handle = Arc::downgrade(&first);
        let _ = state.insert("a".into(), first, None, Instant::now());
        let _ = state.insert("a".into(), RecordingTransport::new(), None, Instant::now());
        assert!(state.remove_if_transport(&"a".into(), &first_handle).is_none());
        assert!(state.contains(&"a".into()));

        let current = Arc::downgrade(&state.target(&"a".into()).unwrap().transport);
        assert!(state.remove_if_transport(&"a".into(), &current).is_some());
    }

    #[test]
    fn board_targets_respect_subscriptions_and_exclusions() {
        let mut state = state_with(&["a", "b", "c", "d"]);
        let _ = state.subscriptions_mut(&"a".into()).unwrap().subscribe(BoardId::new(7));
        let _ = state.subscriptions_mut(&"b".into()).unwrap().subscribe(BoardId::new(8));
        let _ = state.subscriptions_mut(&"c".into()).unwrap().subscribe_all();
        // d stays empty (implicit wildcard)

        let none = HashSet::new();
        assert_eq!(ids(&state.targets(Some(BoardId::new(7)), &none)), ["a", "c", "d"]);

        let exclude: HashSet<ConnectionId> = [ConnectionId::from("c")].into_iter().collect();
        assert_eq!(ids(&state.targets(Some(BoardId::new(7)), &exclude)), ["a", "d"]);
        assert_eq!(ids(&state.targets(None, &exclude)), ["a", "b", "d"]);
    }

    #[test]
    fn record_sends_ignores_stale_serials() {
        let mut state = state_with(&["a"]);
        let stale = state.target(&"a".into()).unwrap().serial;
        let _ = state.insert("a".into(), RecordingTransport::new(), None, Instant::now());
        state.record_sends(&[("a".into(), stale)], 1, Instant::now());
        let snap = state.snapshot(&"a".into(), Instant::now()).unwrap();
        assert_eq!(snap.message_count, 0);
    }

    #[test]
    fn record_send_counts_applies_each_count() {
        let mut state = state_with(&["a", "b"]);
        let a = state.target(&"a".into()).unwrap().serial;
        let b = state.target(&"b".into()).unwrap().serial;
        state.record_send_counts(&[("a".into(), a, 3), ("b".into(), b, 1)], Instant::now());
        let now = Instant::now();
        assert_eq!(state.snapshot(&"a".into(), now).unwrap().message_count, 3);
        assert_eq!(state.snapshot(&"b".into(), now).unwrap().message_count, 1);
    }

    #[test]
    fn heartbeat_response_must_match_latest_id() {
        let mut state = state_with(&["a"]);
        state.begin_heartbeat("hb-1".into(), Instant::now());
        state.begin_heartbeat("hb-2".into(), Instant::now());
        assert!(!state.accept_heartbeat_response(&"a".into(), "hb-1"));
        assert_eq!(state.overdue(2).len(), 1);
        assert!(state.accept_heartbeat_response(&"a".into(), "hb-2"));
        assert!(state.overdue(1).is_empty());
        let snap = state.snapshot(&"a".into(), Instant::now()).unwrap();
        assert_eq!(snap.heartbeat_responses, 1);
        assert_eq!(snap.missed_heartbeats, 0);
    }

    #[test]
    fn heartbeat_response_before_any_heartbeat_is_rejected() {
        let mut state = state_with(&["a"]);
        assert!(state.current_heartbeat().is_none());
        assert!(!state.accept_heartbeat_response(&"a".into(), "anything"));
    }

    #[test]
    fn heartbeat_response_does_not_refresh_activity() {
        let mut state = state_with(&["a"]);
        let start = Instant::now();
        state.begin_heartbeat("hb".into(), start);
        let later = start + Duration::from_secs(500);
        assert!(state.accept_heartbeat_response(&"a".into(), "hb"));
        assert_eq!(state.idle(Duration::from_secs(300), later).len(), 1);
    }

    #[test]
    fn idle_is_strictly_greater_than_timeout() {
        let mut state = RegistryState::default();
        let start = Instant::now();
        let _ = state.insert("a".into(), RecordingTransport::new(), None, start);
        let timeout = Duration::from_secs(300);
        assert!(state.idle(timeout, start + timeout).is_empty());
        assert_eq!(state.idle(timeout, start + timeout + Duration::from_millis(1)).len(), 1);
    }

    #[test]
    fn touch_updates_activity_without_counting_messages() {
        let mut state = RegistryState::default();
        let start = Instant::now();
        let _ = state.insert("a".into(), RecordingTransport::new(), None, start);
        assert!(state.touch(&"a".into(), start + Duration::from_secs(200)));
        assert!(state.idle(Duration::from_secs(300), start + Duration::from_secs(400)).is_empty());
        assert_eq!(state.snapshot(&"a".into(), start).unwrap().message_count, 0);
        assert!(!state.touch(&"missing".into(), start));
    }

    #[test]
    fn stats_sum_messages_and_order_by_connect_time() {
        let mut state = RegistryState::default();
        let start = Instant::now();
        let _ = state.insert("late".into(), RecordingTransport::new(), None, start + Duration::from_secs(5));
        let _ = state.insert("early".into(), RecordingTransport::new(), Some("ann".into()), start);
        assert!(state.record_activity(&"early".into(), start));
        assert!(state.record_activity(&"early".into(), start));
        assert!(state.record_activity(&"late".into(), start));

        let stats = state.stats(start + Duration::from_secs(10));
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.total_messages_sent, 3);
        assert_eq!(stats.connections[0].connection_id.as_str(), "early");
        assert_eq!(stats.connections[0].user_label.as_deref(), Some("ann"));
        assert_eq!(stats.connections[0].connected_secs, 10);
        assert_eq!(stats.connections[1].connected_secs, 5);
    }

    #[test]
    fn drain_empties_everything() {
        let mut state = state_with(&["a", "b"]);
        assert_eq!(state.drain().len(), 2);
        assert_eq!(state.len(), 0);
        assert!(state.subscriptions(&"a".into()).is_none());
    }

    #[test]
    fn eviction_reason_labels() {
        assert_eq!(EvictionReason::SendFailed.to_string(), "send_failed");
        assert_eq!(EvictionReason::MissedHeartbeats.as_str(), "missed_heartbeats");
    }
}
