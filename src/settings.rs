//! Chat instance settings.
//!
//! One explicit struct owned by the coordinator, readable and writable at
//! runtime through typed accessors on [`Chat`](crate::chat::Chat). Changes
//! take effect on the next protocol invocation that reads them.

use crate::policy::JoinPolicy;

/// Settings for one chat instance, also used as construction options.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// The channel every connection starts in and returns to on leave.
    pub lobby: String,

    /// Policy consulted before a channel join is honored.
    pub join_policy: JoinPolicy,

    /// Handshake field holding the pre-negotiated nickname.
    pub nickname_key: String,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            lobby: String::new(),
            join_policy: JoinPolicy::default(),
            nickname_key: "nickname".to_string(),
        }
    }
}
