//! Address scheme: maps logical identities to substrate room addresses.
//!
//! Channels and users live behind distinct prefixes, so a channel name can
//! never collide with a user address even when somebody picks a nickname
//! identical to a channel name.

/// Room address for a named channel.
pub fn channel_address(name: &str) -> String {
    format!("#{name}")
}

/// Room address for a user's direct-delivery room, keyed by nickname.
pub fn user_address(nickname: &str) -> String {
    format!("@{nickname}")
}
