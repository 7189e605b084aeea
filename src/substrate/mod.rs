//! Session substrate contract.
//!
//! The coordinator sits above a bidirectional session layer that owns the
//! sockets. This module defines what that layer must provide: a
//! per-connection async key/value store, named-room membership, addressable
//! broadcast, connection enumeration, and a forced-disconnect primitive.
//! [`memory::MemoryHub`] is a first-party in-process implementation.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::DisconnectReason;

/// Opaque identifier for one live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error reported by the substrate's key/value store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

/// Result of a single store read.
pub type StoreResult = Result<Option<String>, StoreError>;

/// Handshake data negotiated before the coordinator sees the connection.
///
/// A string-keyed map of JSON values; whatever the hosting auth layer
/// produced. The coordinator only reads the configured nickname field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Handshake(serde_json::Map<String, serde_json::Value>);

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Read a field as a string, if present and string-typed.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }
}

/// Events delivered to clients through the substrate.
///
/// Serde-serializable so the hosting transport can encode them however it
/// likes; the coordinator never touches the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Direct message from another user.
    Whispered { from: String, message: String },
    /// Channel message from a member of the recipient's channel.
    Said { from: String, message: String },
    /// Someone joined the recipient's channel.
    Joined { nickname: String },
    /// Someone left the recipient's channel.
    Left { nickname: String },
    /// Plain system/channel/user message from the hosting application.
    Message { text: String },
}

/// Capabilities the session substrate provides to the coordinator.
///
/// Store operations are asynchronous and may complete in any order relative
/// to other in-flight operations; membership and broadcast operations are
/// fire-and-forget.
#[async_trait]
pub trait Namespace: Send + Sync + 'static {
    /// Read a per-connection store value.
    async fn get(&self, conn: ConnectionId, key: &str) -> StoreResult;

    /// Write a per-connection store value.
    async fn set(&self, conn: ConnectionId, key: &str, value: &str) -> Result<(), StoreError>;

    /// Add the connection to a room. Idempotent.
    fn join(&self, conn: ConnectionId, address: &str);

    /// Remove the connection from a room. Idempotent.
    fn leave(&self, conn: ConnectionId, address: &str);

    /// Deliver an event to every member of a room.
    fn emit(&self, address: &str, event: ClientEvent);

    /// Deliver an event to every member of a room except one connection.
    fn emit_except(&self, address: &str, except: ConnectionId, event: ClientEvent);

    /// Deliver an event to every connection in the namespace.
    fn emit_all(&self, event: ClientEvent);

    /// Deliver an event to a single connection.
    fn send(&self, conn: ConnectionId, event: ClientEvent);

    /// Enumerate the connections currently joined to a room.
    fn clients(&self, address: &str) -> Vec<ConnectionId>;

    /// Forcibly terminate a connection.
    fn disconnect(&self, conn: ConnectionId, reason: DisconnectReason);
}
