//! Concurrent dual-read combinator.
//!
//! Most protocol handlers need both the connection's nickname and its current
//! channel before deciding an outcome. Issuing the two store reads
//! sequentially would double the round-trip cost of every such action, so
//! they are driven concurrently and the caller continues only once both have
//! completed. An error in one read never cancels the other: the caller gets
//! both results and inspects both errors explicitly.

use std::future::Future;

use crate::substrate::{ConnectionId, Namespace, StoreResult};

/// Store key holding the connection's nickname. Written once at connect.
pub(crate) const NICKNAME_KEY: &str = "nickname";

/// Store key holding the connection's current channel.
pub(crate) const CHANNEL_KEY: &str = "channel";

/// Drive two futures to completion concurrently and return both outputs.
///
/// Completion order between the two is not guaranteed; the pair is returned
/// only once both are done.
pub async fn rendezvous<A, B>(
    a: impl Future<Output = A>,
    b: impl Future<Output = B>,
) -> (A, B) {
    futures_util::join!(a, b)
}

/// Read the connection's nickname and current channel concurrently.
pub(crate) async fn identity_snapshot(
    namespace: &dyn Namespace,
    conn: ConnectionId,
) -> (StoreResult, StoreResult) {
    rendezvous(
        namespace.get(conn, NICKNAME_KEY),
        namespace.get(conn, CHANNEL_KEY),
    )
    .await
}
