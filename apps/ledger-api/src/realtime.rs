//! Realtime fan-out publisher.
//!
//! After a batch item commits, other connected sessions of the same shop
//! are notified so their running totals update without re-querying. The
//! contract is fire-and-forget: a publish failure must never fail the sync
//! commit that already succeeded.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::json;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Publish contract: `publish(event, shop_id, data)`, best-effort.
pub trait RealtimePublisher: Send + Sync {
    fn publish(&self, event: &str, shop_id: &str, data: serde_json::Value);
}

// =============================================================================
// Redis Implementation
// =============================================================================

/// Redis pub/sub publisher. Events land on `dukan:shop:{shop_id}`.
pub struct RedisPublisher {
    conn: ConnectionManager,
}

impl RedisPublisher {
    /// Connects to Redis. The connection manager reconnects on its own.
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(RedisPublisher { conn })
    }
}

impl RealtimePublisher for RedisPublisher {
    fn publish(&self, event: &str, shop_id: &str, data: serde_json::Value) {
        let channel = format!("dukan:shop:{}", shop_id);
        let payload = json!({
            "event": event,
            "shopId": shop_id,
            "data": data,
        })
        .to_string();

        // Detached: the commit already succeeded, delivery is best-effort.
        let mut conn = self.conn.clone();
        tokio::spawn(async move {
            match conn.publish::<_, _, ()>(&channel, &payload).await {
                Ok(()) => debug!(channel = %channel, "Realtime event published"),
                Err(e) => warn!(?e, channel = %channel, "Realtime publish failed"),
            }
        });
    }
}

// =============================================================================
// No-op & Recording Implementations
// =============================================================================

/// Publisher used when Redis is not configured.
pub struct NoopPublisher;

impl RealtimePublisher for NoopPublisher {
    fn publish(&self, _event: &str, _shop_id: &str, _data: serde_json::Value) {}
}

/// In-memory publisher for tests: records every publish call.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, String, serde_json::Value)>>,
}

impl RecordingPublisher {
    /// Returns a snapshot of recorded `(event, shop_id, data)` triples.
    pub fn recorded(&self) -> Vec<(String, String, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }
}

impl RealtimePublisher for RecordingPublisher {
    fn publish(&self, event: &str, shop_id: &str, data: serde_json::Value) {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), shop_id.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_publisher_captures_calls() {
        let publisher = RecordingPublisher::default();
        publisher.publish("sale.committed", "shop-1", json!({ "totalCents": 300 }));

        let recorded = publisher.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "sale.committed");
        assert_eq!(recorded[0].1, "shop-1");
    }
}
