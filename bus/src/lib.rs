//! The message bus (§4.A): a typed pub/sub abstraction over the shared KV
//! store or any equivalent broker. Delivery is at-least-once; every
//! subscriber must tolerate duplicates.

pub mod error;
pub mod local;
#[cfg(feature = "redis-backend")]
pub mod redis_bus;

use std::time::Duration;

use async_trait::async_trait;
use protocol::Envelope;

pub use error::BusError;
pub use local::LocalBus;
#[cfg(feature = "redis-backend")]
pub use redis_bus::RedisBus;

/// A live subscription to one channel. Pull-based: callers `recv().await` in
/// a loop, which is the idiomatic Rust shape for "asynchronous delivery" —
/// the equivalent of registering a re-entrant, idempotent handler.
pub struct Subscription {
    receiver: tokio::sync::mpsc::Receiver<Envelope>,
}

impl Subscription {
    pub fn new(receiver: tokio::sync::mpsc::Receiver<Envelope>) -> Self {
        Subscription { receiver }
    }

    /// Waits for the next envelope. Returns `None` once the bus side of the
    /// channel has been dropped (backend gone, or explicitly closed).
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

/// The message bus contract every server-fleet process shares.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Fans out `envelope` to every current subscriber of `channel`.
    async fn broadcast(&self, channel: &str, envelope: Envelope) -> Result<(), BusError>;

    /// Directed delivery to `channel` (e.g. `server:<id>`). Over a
    /// topic-based broker this is the same wire operation as
    /// [`Bus::broadcast`] — the distinction is in how many subscribers a
    /// channel is expected to have, not in transport behavior.
    async fn send(&self, channel: &str, envelope: Envelope) -> Result<(), BusError> {
        self.broadcast(channel, envelope).await
    }

    /// Subscribes to `channel`. The returned [`Subscription`] keeps
    /// delivering until dropped or the backend disconnects.
    fn subscribe(&self, channel: &str) -> Subscription;

    /// Sends `envelope` to `channel` with a fresh, unique reply channel
    /// stamped into [`Envelope::reply_channel`], then awaits exactly one
    /// reply on that channel or times out. The responder must read
    /// `reply_channel` off the request and `send` its answer there.
    async fn request(
        &self,
        channel: &str,
        mut envelope: Envelope,
        timeout: Duration,
    ) -> Result<Envelope, BusError> {
        let reply_channel = format!("request:{}", uuid::Uuid::new_v4());
        envelope.reply_channel = Some(reply_channel.clone());
        let mut subscription = self.subscribe(&reply_channel);
        self.broadcast(channel, envelope).await?;
        match tokio::time::timeout(timeout, subscription.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) | Err(_) => Err(BusError::Timeout {
                channel: channel.to_string(),
            }),
        }
    }

    /// Rebinds the process's self-channels after its server id changes
    /// (temp id -> permanent id). A no-op on backends with no persistent
    /// per-identity subscription state; [`LocalBus`] and [`RedisBus`] are
    /// both stateless here since callers just subscribe to the new channel
    /// names directly, but the hook exists so an agent can call it
    /// uniformly regardless of backend.
    fn refresh_server_identity(&self) {}
}
