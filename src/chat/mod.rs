//! Chat coordinator: connection onboarding, action dispatch, admin API.
//!
//! One `Chat` per hosted namespace. The hosting application reports substrate
//! lifecycle events through [`Chat::on_connection`] / [`Chat::on_disconnect`]
//! and submits inbound client actions through [`Chat::dispatch`]; the
//! coordinator handles everything else: nickname onboarding, lobby placement,
//! channel membership, message routing, and administrative eviction.

pub mod protocol;

use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::address::{channel_address, user_address};
use crate::error::{ChatError, DisconnectReason};
use crate::policy::JoinPolicy;
use crate::settings::ChatOptions;
use crate::substrate::{ClientEvent, ConnectionId, Handshake, Namespace};

/// Coordinator-level lifecycle events, delivered over [`Chat::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A connection finished onboarding and now sits in the lobby.
    Connected { nickname: String },
}

/// Acknowledgement channel for actions that report an outcome.
pub type Ack = oneshot::Sender<Result<(), ChatError>>;

/// Inbound client actions.
///
/// Actions on one connection are processed strictly one at a time, in
/// submission order; actions across connections interleave freely.
#[derive(Debug)]
pub enum Action {
    /// Switch to a channel. Rejected for the lobby; gated by the join policy.
    Join { channel: String, ack: Option<Ack> },
    /// Return to the lobby.
    Leave { ack: Option<Ack> },
    /// Broadcast to the sender's current channel. Fire-and-forget.
    Say { message: String },
    /// Direct message to one nickname.
    Whisper {
        target: String,
        message: String,
        ack: Option<Ack>,
    },
}

/// Sender half of one connection's serialized action queue.
type ActionQueue = mpsc::UnboundedSender<Action>;

/// The coordination layer for one namespace.
pub struct Chat {
    namespace: Arc<dyn Namespace>,
    settings: RwLock<ChatOptions>,
    events: broadcast::Sender<ChatEvent>,
    queues: DashMap<ConnectionId, ActionQueue>,
}

impl Chat {
    /// Create a coordinator over a session substrate.
    pub fn new(namespace: Arc<dyn Namespace>, options: ChatOptions) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            namespace,
            settings: RwLock::new(options),
            events,
            queues: DashMap::new(),
        })
    }

    /// Subscribe to coordinator lifecycle events. Unsubscribe by dropping
    /// the receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Onboard a new substrate connection.
    ///
    /// Extracts the pre-negotiated nickname from the handshake, registers the
    /// connection's action worker, and drives it into the lobby. Connections
    /// without a usable nickname are disconnected and never become active.
    pub async fn on_connection(self: &Arc<Self>, conn: ConnectionId, handshake: Handshake) {
        let nickname_key = self.settings().nickname_key.clone();
        let nickname = handshake
            .str_field(&nickname_key)
            .filter(|n| !n.is_empty())
            .map(str::to_owned);

        // We cannot handle clients without nicknames.
        let Some(nickname) = nickname else {
            tracing::warn!(conn = %conn, "no nickname in handshake, disconnecting");
            self.namespace.disconnect(conn, DisconnectReason::Error);
            return;
        };

        // The per-user address room is held for the connection's lifetime;
        // it is how whispers and user-targeted sends find this session.
        self.namespace.join(conn, &user_address(&nickname));

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.queues.insert(conn, tx);
        tracing::info!(conn = %conn, nickname = %nickname, "connection registered");

        // One worker per connection: onboarding first, then the queued
        // actions, one at a time.
        let chat = Arc::clone(self);
        tokio::spawn(async move {
            if protocol::onboard(&chat, conn, &nickname).await {
                while let Some(action) = rx.recv().await {
                    protocol::handle(&chat, conn, action).await;
                }
            }
            tracing::debug!(conn = %conn, "action worker stopped");
        });
    }

    /// Tear down coordinator state for a session the substrate reports gone.
    pub fn on_disconnect(&self, conn: ConnectionId) {
        self.drop_connection(conn);
    }

    /// Submit an inbound client action for processing.
    ///
    /// Actions for unknown or already-gone connections are answered with
    /// [`ChatError::Internal`] when they carry an ack, and dropped otherwise.
    pub fn dispatch(&self, conn: ConnectionId, action: Action) {
        let rejected = match self.queues.get(&conn) {
            Some(queue) => queue.send(action).err().map(|e| e.0),
            None => Some(action),
        };
        if let Some(action) = rejected {
            tracing::debug!(conn = %conn, "action for inactive connection rejected");
            if let Action::Join { ack: Some(ack), .. }
            | Action::Leave { ack: Some(ack) }
            | Action::Whisper { ack: Some(ack), .. } = action
            {
                let _ = ack.send(Err(ChatError::Internal));
            }
        }
    }

    // --- Administrative API ---

    /// Forcibly disconnect every connection registered under a nickname.
    pub fn kick(&self, nickname: &str) -> &Self {
        for conn in self.namespace.clients(&user_address(nickname)) {
            self.drop_connection(conn);
            self.namespace.disconnect(conn, DisconnectReason::Booted);
        }
        self
    }

    /// Send a plain message to every member of a channel.
    pub fn send_channel(&self, channel: &str, text: &str) -> &Self {
        self.namespace.emit(
            &channel_address(channel),
            ClientEvent::Message { text: text.to_string() },
        );
        self
    }

    /// Send a plain message to every connection in the namespace.
    pub fn send_system(&self, text: &str) -> &Self {
        self.namespace
            .emit_all(ClientEvent::Message { text: text.to_string() });
        self
    }

    /// Send a plain message to every connection registered under a nickname.
    pub fn send_user(&self, nickname: &str, text: &str) -> &Self {
        self.namespace.emit(
            &user_address(nickname),
            ClientEvent::Message { text: text.to_string() },
        );
        self
    }

    /// Connections currently registered under a nickname.
    pub fn user(&self, nickname: &str) -> Vec<ConnectionId> {
        self.namespace.clients(&user_address(nickname))
    }

    /// Connections currently in a channel.
    pub fn channel(&self, name: &str) -> Vec<ConnectionId> {
        self.namespace.clients(&channel_address(name))
    }

    // --- Settings ---

    /// Snapshot of the current settings.
    pub fn options(&self) -> ChatOptions {
        self.settings().clone()
    }

    /// The current lobby channel name.
    pub fn lobby(&self) -> String {
        self.settings().lobby.clone()
    }

    /// The handshake field the nickname is read from.
    pub fn nickname_key(&self) -> String {
        self.settings().nickname_key.clone()
    }

    /// Change the lobby channel. Takes effect on the next protocol run.
    pub fn set_lobby(&self, lobby: impl Into<String>) -> &Self {
        self.settings_mut().lobby = lobby.into();
        self
    }

    /// Change the join policy. Takes effect on the next join request.
    pub fn set_join_policy(&self, policy: impl Into<JoinPolicy>) -> &Self {
        self.settings_mut().join_policy = policy.into();
        self
    }

    /// Change the handshake nickname field. Affects future connections only.
    pub fn set_nickname_key(&self, key: impl Into<String>) -> &Self {
        self.settings_mut().nickname_key = key.into();
        self
    }

    // --- Internals shared with the protocol handlers ---

    pub(crate) fn namespace(&self) -> &dyn Namespace {
        self.namespace.as_ref()
    }

    pub(crate) fn settings(&self) -> std::sync::RwLockReadGuard<'_, ChatOptions> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn settings_mut(&self) -> std::sync::RwLockWriteGuard<'_, ChatOptions> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit_event(&self, event: ChatEvent) {
        // No subscribers is fine; the event bus is best-effort.
        let _ = self.events.send(event);
    }

    pub(crate) fn drop_connection(&self, conn: ConnectionId) {
        if self.queues.remove(&conn).is_some() {
            tracing::info!(conn = %conn, "connection unregistered");
        }
    }
}
