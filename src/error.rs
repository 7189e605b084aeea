//! Coordinator-level error taxonomy.
//!
//! Every user-visible failure is one of a small closed set of cases,
//! delivered through the acknowledgement channel of the action that caused
//! it. Nothing here is ever panicked or thrown across the API boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a client action that did not succeed.
///
/// The `Display` strings are the exact messages clients see.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatError {
    /// Store read/write failed, or required per-connection state is missing.
    #[error("Internal error")]
    Internal,

    /// The join policy denied the request, or joins are disabled entirely.
    #[error("Not permitted")]
    NotPermitted,

    /// The lobby can only be returned to via leave, never joined directly.
    #[error("Can't join lobby, please leave room instead")]
    LobbyJoinRejected,

    /// Whisper target has no active connection.
    #[error("Unknown user")]
    UnknownUser,

    /// Persisting the new channel failed; the connection was recovered to
    /// the lobby.
    #[error("Can't change channel")]
    ChannelChangeFailed,

    /// Persisting the lobby placement failed; the connection was terminated.
    #[error("Can't join lobby")]
    LobbyJoinFailed,
}

/// Why a connection was forcibly terminated.
///
/// Kicks are distinguishable from disconnects caused by unrecoverable state
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Administrative eviction via [`kick`](crate::chat::Chat::kick).
    Booted,
    /// The connection's stored state could no longer be kept consistent
    /// with its room membership.
    Error,
}

impl DisconnectReason {
    /// Wire form of the reason, as delivered to the substrate.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booted => "booted",
            Self::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_strings_match_the_protocol() {
        assert_eq!(ChatError::Internal.to_string(), "Internal error");
        assert_eq!(ChatError::NotPermitted.to_string(), "Not permitted");
        assert_eq!(
            ChatError::LobbyJoinRejected.to_string(),
            "Can't join lobby, please leave room instead"
        );
        assert_eq!(ChatError::UnknownUser.to_string(), "Unknown user");
        assert_eq!(ChatError::ChannelChangeFailed.to_string(), "Can't change channel");
        assert_eq!(ChatError::LobbyJoinFailed.to_string(), "Can't join lobby");
    }

    #[test]
    fn kick_reason_is_booted() {
        assert_eq!(DisconnectReason::Booted.as_str(), "booted");
        assert_ne!(DisconnectReason::Error.as_str(), DisconnectReason::Booted.as_str());
    }
}
