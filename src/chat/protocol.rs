//! Protocol handlers for the per-connection state machine.
//!
//! Each handler snapshots the connection's identity (nickname, channel)
//! through the rendezvous reader, applies the join policy where relevant,
//! mutates room membership and stored state through the substrate, and
//! announces the outcome. The snapshot may be stale by the time a write
//! lands; consistency is kept by recovering to the lobby or terminating the
//! connection whenever a write fails, never by leaving membership and stored
//! state diverged.

use crate::address::{channel_address, user_address};
use crate::error::{ChatError, DisconnectReason};
use crate::rendezvous::{identity_snapshot, CHANNEL_KEY, NICKNAME_KEY};
use crate::substrate::{ClientEvent, ConnectionId, StoreResult};

use super::{Ack, Action, Chat, ChatEvent};

/// Process one queued action.
pub(crate) async fn handle(chat: &Chat, conn: ConnectionId, action: Action) {
    match action {
        Action::Join { channel, ack } => {
            let outcome = join(chat, conn, &channel).await;
            respond(ack, outcome);
        }
        Action::Leave { ack } => {
            let outcome = leave(chat, conn).await;
            respond(ack, outcome);
        }
        Action::Say { message } => say(chat, conn, &message).await,
        Action::Whisper { target, message, ack } => {
            let outcome = whisper(chat, conn, &target, &message).await;
            respond(ack, outcome);
        }
    }
}

fn respond(ack: Option<Ack>, outcome: Result<(), ChatError>) {
    if let Some(ack) = ack {
        // The requester may have stopped waiting; that is not our problem.
        let _ = ack.send(outcome);
    }
}

/// Finish onboarding a connection whose nickname is already known: persist
/// the nickname, then reuse the leave protocol to land it in the lobby.
///
/// Returns whether the connection survived onboarding.
pub(crate) async fn onboard(chat: &Chat, conn: ConnectionId, nickname: &str) -> bool {
    if let Err(err) = chat.namespace().set(conn, NICKNAME_KEY, nickname).await {
        chat.namespace()
            .send(conn, ClientEvent::Message { text: "Can't set nickname".to_string() });
        tracing::warn!(
            conn = %conn,
            nickname = %nickname,
            error = %err,
            "failed to persist nickname, disconnecting"
        );
        chat.drop_connection(conn);
        chat.namespace().disconnect(conn, DisconnectReason::Error);
        return false;
    }

    // A failed lobby placement has already disconnected the connection (and
    // closed its queue); anything else leaves the worker running, it just
    // never announces the connection.
    if leave(chat, conn).await.is_ok() {
        chat.emit_event(ChatEvent::Connected { nickname: nickname.to_string() });
    }
    true
}

/// Switch the connection to a new channel.
async fn join(chat: &Chat, conn: ConnectionId, channel: &str) -> Result<(), ChatError> {
    let (lobby, policy) = {
        let settings = chat.settings();
        (settings.lobby.clone(), settings.join_policy.clone())
    };

    if policy.is_disabled() {
        return Err(ChatError::NotPermitted);
    }
    // The lobby is reached by leaving, never by joining.
    if channel == lobby {
        return Err(ChatError::LobbyJoinRejected);
    }

    let (nick, chan) = identity_snapshot(chat.namespace(), conn).await;
    let (nickname, previous) = require_identity(conn, nick, chan)?;

    if !policy.evaluate(&nickname, channel).await {
        return Err(ChatError::NotPermitted);
    }

    if let Some(previous) = previous {
        chat.namespace().leave(conn, &channel_address(&previous));
        // Lobby exits are not announced.
        if previous != lobby {
            chat.namespace().emit_except(
                &channel_address(&previous),
                conn,
                ClientEvent::Left { nickname: nickname.clone() },
            );
        }
    }
    chat.namespace().join(conn, &channel_address(channel));

    if let Err(err) = chat.namespace().set(conn, CHANNEL_KEY, channel).await {
        tracing::warn!(
            conn = %conn,
            nickname = %nickname,
            channel = %channel,
            error = %err,
            "failed to persist channel, recovering to lobby"
        );
        // Roll back membership for the failed target, then return the
        // connection to a known-consistent lobby state.
        chat.namespace().leave(conn, &channel_address(channel));
        let _ = leave(chat, conn).await;
        return Err(ChatError::ChannelChangeFailed);
    }

    chat.namespace().emit_except(
        &channel_address(channel),
        conn,
        ClientEvent::Joined { nickname },
    );
    Ok(())
}

/// Return the connection to the lobby. Also used to establish the lobby at
/// connect time and to recover from a failed channel switch.
async fn leave(chat: &Chat, conn: ConnectionId) -> Result<(), ChatError> {
    let lobby = chat.settings().lobby.clone();

    let (nick, chan) = identity_snapshot(chat.namespace(), conn).await;
    let (nickname, previous) = require_identity(conn, nick, chan)?;

    if let Some(previous) = previous.filter(|p| *p != lobby) {
        chat.namespace().leave(conn, &channel_address(&previous));
        chat.namespace().emit_except(
            &channel_address(&previous),
            conn,
            ClientEvent::Left { nickname },
        );
    }
    chat.namespace().join(conn, &channel_address(&lobby));

    if let Err(err) = chat.namespace().set(conn, CHANNEL_KEY, &lobby).await {
        tracing::warn!(
            conn = %conn,
            error = %err,
            "failed to persist lobby placement, disconnecting"
        );
        // Without a consistent nickname/channel pair the connection is
        // unrecoverable; terminate it rather than leave it ambiguous.
        chat.drop_connection(conn);
        chat.namespace().disconnect(conn, DisconnectReason::Error);
        return Err(ChatError::LobbyJoinFailed);
    }
    Ok(())
}

/// Broadcast to the speaker's current channel, speaker included.
async fn say(chat: &Chat, conn: ConnectionId, message: &str) {
    let (nick, chan) = identity_snapshot(chat.namespace(), conn).await;
    // Best-effort messaging has no error channel back to the speaker.
    let (Ok(Some(nickname)), Ok(Some(channel))) = (nick, chan) else {
        tracing::debug!(conn = %conn, "dropping say from connection with incomplete identity");
        return;
    };
    chat.namespace().emit(
        &channel_address(&channel),
        ClientEvent::Said { from: nickname, message: message.to_string() },
    );
}

/// Direct message to every connection registered under the target nickname.
async fn whisper(
    chat: &Chat,
    conn: ConnectionId,
    target: &str,
    message: &str,
) -> Result<(), ChatError> {
    let nickname = match chat.namespace().get(conn, NICKNAME_KEY).await {
        Ok(Some(nickname)) if !nickname.is_empty() => nickname,
        Ok(_) => return Err(ChatError::Internal),
        Err(err) => {
            tracing::warn!(conn = %conn, error = %err, "nickname read failed during whisper");
            return Err(ChatError::Internal);
        }
    };

    let address = user_address(target);
    if chat.namespace().clients(&address).is_empty() {
        return Err(ChatError::UnknownUser);
    }
    chat.namespace().emit(
        &address,
        ClientEvent::Whispered { from: nickname, message: message.to_string() },
    );
    Ok(())
}

/// Unpack the identity snapshot: both reads must have succeeded and the
/// nickname must be present, otherwise the action fails as an internal
/// error. A missing channel is legal (the initial lobby placement has not
/// landed yet) and is handed back as `None`.
fn require_identity(
    conn: ConnectionId,
    nick: StoreResult,
    chan: StoreResult,
) -> Result<(String, Option<String>), ChatError> {
    match (nick, chan) {
        (Ok(Some(nickname)), Ok(previous)) if !nickname.is_empty() => Ok((nickname, previous)),
        (Ok(_), Ok(_)) => Err(ChatError::Internal),
        (nick, chan) => {
            tracing::warn!(
                conn = %conn,
                nickname_err = nick.is_err(),
                channel_err = chan.is_err(),
                "identity snapshot failed"
            );
            Err(ChatError::Internal)
        }
    }
}
