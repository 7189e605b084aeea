//! Join-permission policy.
//!
//! A chat instance either allows/denies all channel joins outright or
//! delegates the decision to a caller-supplied asynchronous function. Both
//! forms resolve through the same async path, so protocol code never
//! special-cases the fixed variant.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

/// Caller-supplied decision function: `(nickname, channel) -> allow`.
pub type DecideFn = dyn Fn(&str, &str) -> BoxFuture<'static, bool> + Send + Sync;

/// Policy consulted before a channel join is honored.
///
/// No timeout is imposed on the `Decide` variant: a decision future that
/// never resolves stalls that join request indefinitely. That is the
/// caller's responsibility to avoid, not something the coordinator papers
/// over.
#[derive(Clone)]
pub enum JoinPolicy {
    /// Allow or deny every join.
    Fixed(bool),
    /// Ask the hosting application per (nickname, channel) pair.
    Decide(Arc<DecideFn>),
}

impl JoinPolicy {
    /// Wrap an async decision function.
    pub fn decide<F, Fut>(f: F) -> Self
    where
        F: Fn(&str, &str) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self::Decide(Arc::new(
            move |nickname, channel| -> BoxFuture<'static, bool> {
                Box::pin(f(nickname, channel))
            },
        ))
    }

    /// Whether the instance-wide permission flag is switched off.
    ///
    /// Only `Fixed(false)` disables joins outright; a decision function is
    /// always consulted, even one that happens to deny everything.
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Fixed(false))
    }

    /// Evaluate the policy for one join request.
    pub async fn evaluate(&self, nickname: &str, channel: &str) -> bool {
        match self {
            Self::Fixed(allow) => *allow,
            Self::Decide(f) => f(nickname, channel).await,
        }
    }
}

impl Default for JoinPolicy {
    fn default() -> Self {
        Self::Fixed(true)
    }
}

impl From<bool> for JoinPolicy {
    fn from(allow: bool) -> Self {
        Self::Fixed(allow)
    }
}

impl fmt::Debug for JoinPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(allow) => f.debug_tuple("Fixed").field(allow).finish(),
            Self::Decide(_) => f.write_str("Decide(..)"),
        }
    }
}
