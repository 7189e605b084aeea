//! palaver — connection and channel coordination for real-time group
//! messaging.
//!
//! Sits above a session substrate (see [`substrate::Namespace`]) that owns
//! the actual sockets, and coordinates everything semantic: nickname-based
//! onboarding, exclusive per-connection channel membership, message routing
//! (system-wide, channel-scoped, direct whisper), administrative eviction,
//! and a pluggable join-permission policy.

pub mod address;
pub mod chat;
pub mod error;
pub mod policy;
pub mod rendezvous;
pub mod settings;
pub mod substrate;

pub use chat::{Ack, Action, Chat, ChatEvent};
pub use error::{ChatError, DisconnectReason};
pub use policy::JoinPolicy;
pub use settings::ChatOptions;
pub use substrate::{ClientEvent, ConnectionId, Handshake, Namespace, StoreError};
