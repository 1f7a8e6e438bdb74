//! Redis-backed bus: `PUBLISH`/`SUBSCRIBE` stand in for the broker named in
//! §4.A ("or any equivalent broker"). Uses a connection-manager for
//! publishing and a dedicated pubsub connection per subscription.

use async_trait::async_trait;
use futures_util::StreamExt;
use protocol::Envelope;
use redis::AsyncCommands;

use crate::{Bus, BusError, Subscription};

/// A bus backed by a real Redis instance.
pub struct RedisBus {
    client: redis::Client,
    publish_conn: redis::aio::ConnectionManager,
}

impl RedisBus {
    pub async fn connect(redis_url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let publish_conn = redis::aio::ConnectionManager::new(client.clone()).await?;
        Ok(RedisBus {
            client,
            publish_conn,
        })
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn broadcast(&self, channel: &str, envelope: Envelope) -> Result<(), BusError> {
        let payload = serde_json::to_string(&envelope).map_err(BusError::Encode)?;
        let mut conn = self.publish_conn.clone();
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> Subscription {
        let client = self.client.clone();
        let channel = channel.to_string();
        let (tx, rx) = tokio::sync::mpsc::channel(1024);
        tokio::spawn(async move {
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(p) => p,
                Err(error) => {
                    tracing::error!(?error, channel, "redis pubsub connection failed");
                    return;
                }
            };
            if let Err(error) = pubsub.subscribe(&channel).await {
                tracing::error!(?error, channel, "redis SUBSCRIBE failed");
                return;
            }
            let mut messages = pubsub.on_message();
            while let Some(message) = messages.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(error) => {
                        tracing::warn!(?error, "non-string redis pubsub payload");
                        continue;
                    }
                };
                match serde_json::from_str::<Envelope>(&payload) {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(?error, "failed to decode envelope from redis");
                    }
                }
            }
        });
        Subscription::new(rx)
    }
}
