//! In-process bus backed by `tokio::sync::broadcast`, used in tests and as
//! the default transport for a single-binary deployment.

use async_trait::async_trait;
use dashmap::DashMap;
use protocol::Envelope;
use tokio::sync::broadcast;

use crate::{Bus, BusError, Subscription};

const CHANNEL_CAPACITY: usize = 1024;

/// A bus that fans messages out in-process only. Subscribers that haven't
/// yet attached to a channel when a message is broadcast simply never see
/// it — matching the at-least-once, no-durable-history semantics of the
/// real broker this stands in for.
#[derive(Default)]
pub struct LocalBus {
    channels: DashMap<String, broadcast::Sender<Envelope>>,
}

impl LocalBus {
    pub fn new() -> Self {
        LocalBus {
            channels: DashMap::new(),
        }
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<Envelope> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl Bus for LocalBus {
    async fn broadcast(&self, channel: &str, envelope: Envelope) -> Result<(), BusError> {
        // No subscribers yet is not an error: the real broker would still
        // accept the publish and simply have no one to deliver to.
        let _ = self.sender_for(channel).send(envelope);
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> Subscription {
        let mut broadcast_rx = self.sender_for(channel).subscribe();
        let (tx, rx) = tokio::sync::mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber lagged on local bus channel");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        Subscription::new(rx)
    }
}
