//! In-process session substrate.
//!
//! Backs the integration tests and single-process embedders: rooms and the
//! per-connection store live in concurrent maps, events are delivered through
//! per-connection mpsc inboxes. Store failures can be injected per
//! connection/key to exercise the coordinator's fatal error paths.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{ClientEvent, ConnectionId, Namespace, StoreError, StoreResult};
use crate::error::DisconnectReason;

/// In-memory substrate hub. One per namespace.
#[derive(Default)]
pub struct MemoryHub {
    /// Room address -> member connections.
    rooms: DashMap<String, HashSet<ConnectionId>>,
    /// Per-connection key/value store.
    store: DashMap<ConnectionId, HashMap<String, String>>,
    /// Per-connection event inbox senders.
    inboxes: DashMap<ConnectionId, mpsc::UnboundedSender<ClientEvent>>,
    /// Reasons for forced disconnects, kept for post-mortem queries.
    disconnected: DashMap<ConnectionId, DisconnectReason>,
    /// One-shot write failures armed per (connection, key).
    set_failures: DashMap<(ConnectionId, String), ()>,
    /// One-shot read failures armed per (connection, key).
    get_failures: DashMap<(ConnectionId, String), ()>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and return its id plus event inbox.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ClientEvent>) {
        let conn = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.store.insert(conn, HashMap::new());
        self.inboxes.insert(conn, tx);
        (conn, rx)
    }

    /// Whether the session is still registered.
    pub fn is_connected(&self, conn: ConnectionId) -> bool {
        self.inboxes.contains_key(&conn)
    }

    /// Reason the session was forcibly disconnected, if it was.
    pub fn disconnect_reason(&self, conn: ConnectionId) -> Option<DisconnectReason> {
        self.disconnected.get(&conn).map(|r| *r)
    }

    /// Number of connections currently joined to a room.
    pub fn members(&self, address: &str) -> usize {
        self.rooms.get(address).map(|m| m.len()).unwrap_or(0)
    }

    /// All rooms the connection is currently a member of.
    pub fn rooms_of(&self, conn: ConnectionId) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|entry| entry.value().contains(&conn))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Read a stored value directly, bypassing the async store interface.
    pub fn stored(&self, conn: ConnectionId, key: &str) -> Option<String> {
        self.store.get(&conn).and_then(|m| m.get(key).cloned())
    }

    /// Arm a one-shot failure for the next `set` of `key` on `conn`.
    pub fn fail_set_for(&self, conn: ConnectionId, key: &str) {
        self.set_failures.insert((conn, key.to_string()), ());
    }

    /// Arm a one-shot failure for the next `get` of `key` on `conn`.
    pub fn fail_get_for(&self, conn: ConnectionId, key: &str) {
        self.get_failures.insert((conn, key.to_string()), ());
    }
}

#[async_trait]
impl Namespace for MemoryHub {
    async fn get(&self, conn: ConnectionId, key: &str) -> StoreResult {
        if self.get_failures.remove(&(conn, key.to_string())).is_some() {
            return Err(StoreError(format!("injected read failure for {key}")));
        }
        Ok(self.stored(conn, key))
    }

    async fn set(&self, conn: ConnectionId, key: &str, value: &str) -> Result<(), StoreError> {
        if self.set_failures.remove(&(conn, key.to_string())).is_some() {
            return Err(StoreError(format!("injected write failure for {key}")));
        }
        match self.store.get_mut(&conn) {
            Some(mut map) => {
                map.insert(key.to_string(), value.to_string());
                Ok(())
            }
            None => Err(StoreError(format!("no store for connection {conn}"))),
        }
    }

    fn join(&self, conn: ConnectionId, address: &str) {
        self.rooms
            .entry(address.to_string())
            .or_default()
            .insert(conn);
    }

    fn leave(&self, conn: ConnectionId, address: &str) {
        if let Some(mut members) = self.rooms.get_mut(address) {
            members.remove(&conn);
        }
    }

    fn emit(&self, address: &str, event: ClientEvent) {
        let Some(members) = self.rooms.get(address) else {
            return;
        };
        for conn in members.iter() {
            if let Some(tx) = self.inboxes.get(conn) {
                let _ = tx.send(event.clone());
            }
        }
    }

    fn emit_except(&self, address: &str, except: ConnectionId, event: ClientEvent) {
        let Some(members) = self.rooms.get(address) else {
            return;
        };
        for conn in members.iter().filter(|c| **c != except) {
            if let Some(tx) = self.inboxes.get(conn) {
                let _ = tx.send(event.clone());
            }
        }
    }

    fn emit_all(&self, event: ClientEvent) {
        for entry in self.inboxes.iter() {
            let _ = entry.value().send(event.clone());
        }
    }

    fn send(&self, conn: ConnectionId, event: ClientEvent) {
        if let Some(tx) = self.inboxes.get(&conn) {
            let _ = tx.send(event);
        }
    }

    fn clients(&self, address: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(address)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    fn disconnect(&self, conn: ConnectionId, reason: DisconnectReason) {
        tracing::info!(conn = %conn, reason = reason.as_str(), "forced disconnect");
        self.disconnected.insert(conn, reason);
        self.inboxes.remove(&conn);
        self.store.remove(&conn);
        for mut entry in self.rooms.iter_mut() {
            entry.value_mut().remove(&conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_round_trips_per_connection() {
        let hub = MemoryHub::new();
        let (a, _rx_a) = hub.connect();
        let (b, _rx_b) = hub.connect();

        hub.set(a, "nickname", "alice").await.unwrap();
        assert_eq!(hub.get(a, "nickname").await.unwrap().as_deref(), Some("alice"));
        assert_eq!(hub.get(b, "nickname").await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_failures_fire_exactly_once() {
        let hub = MemoryHub::new();
        let (conn, _rx) = hub.connect();

        hub.fail_set_for(conn, "channel");
        assert!(hub.set(conn, "channel", "x").await.is_err());
        assert!(hub.set(conn, "channel", "x").await.is_ok());

        hub.fail_get_for(conn, "channel");
        assert!(hub.get(conn, "channel").await.is_err());
        assert_eq!(hub.get(conn, "channel").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn emit_except_skips_the_excluded_connection() {
        let hub = MemoryHub::new();
        let (a, mut rx_a) = hub.connect();
        let (b, mut rx_b) = hub.connect();
        hub.join(a, "#room");
        hub.join(b, "#room");

        hub.emit_except(
            "#room",
            a,
            ClientEvent::Joined { nickname: "alice".to_string() },
        );
        assert!(rx_a.try_recv().is_err());
        assert_eq!(
            rx_b.try_recv().unwrap(),
            ClientEvent::Joined { nickname: "alice".to_string() }
        );
    }

    #[tokio::test]
    async fn disconnect_clears_membership_and_records_reason() {
        let hub = MemoryHub::new();
        let (conn, _rx) = hub.connect();
        hub.join(conn, "#room");
        hub.join(conn, "@alice");

        hub.disconnect(conn, DisconnectReason::Booted);
        assert!(!hub.is_connected(conn));
        assert_eq!(hub.disconnect_reason(conn), Some(DisconnectReason::Booted));
        assert_eq!(hub.members("#room"), 0);
        assert_eq!(hub.members("@alice"), 0);
    }
}
