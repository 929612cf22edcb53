use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use redis::Commands;
use serde_json::json;
use tracing::{debug, warn};

/// Structured log records mirrored for the dashboard
pub const CHANNEL_LOGS: &str = "codeworm:logs";
/// Lifecycle transitions (cycle_starting, analyzing, ...)
pub const CHANNEL_EVENTS: &str = "codeworm:events";
/// Periodic statistics snapshots
pub const CHANNEL_STATS: &str = "codeworm:stats";

/// Best-effort fan-out to the dashboard over redis pub/sub.
///
/// Publishing never errors toward the caller: a dead connection is dropped
/// and reconnected on the next publish. Subscribers that fail do not affect
/// the publisher.
pub struct EventPublisher {
   client: redis::Client,
   conn:   Mutex<Option<redis::Connection>>,
}

impl EventPublisher {
   const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

   /// Connect to redis; returns None when the URL does not parse. An
   /// unreachable server still yields a publisher that retries lazily.
   pub fn connect(redis_url: &str) -> Option<Self> {
      let client = match redis::Client::open(redis_url) {
         Ok(client) => client,
         Err(e) => {
            warn!(error = %e, "invalid redis URL, events disabled");
            return None;
         },
      };

      let conn = client.get_connection_with_timeout(Self::CONNECT_TIMEOUT).ok();
      if conn.is_none() {
         debug!("redis not reachable yet, will retry on publish");
      }

      Some(Self { client, conn: Mutex::new(conn) })
   }

   fn publish(&self, channel: &str, payload: &str) {
      let mut guard = self.conn.lock();

      if guard.is_none() {
         *guard = self.client.get_connection_with_timeout(Self::CONNECT_TIMEOUT).ok();
      }

      if let Some(conn) = guard.as_mut() {
         let result: redis::RedisResult<i64> = conn.publish(channel, payload);
         if result.is_err() {
            // Drop the connection; the next publish reconnects
            *guard = None;
         }
      }
   }

   /// Publish a lifecycle event
   pub fn publish_event(&self, event_type: &str, data: serde_json::Value) {
      let payload = json!({
         "type": event_type,
         "timestamp": Utc::now().to_rfc3339(),
         "data": data,
      });
      self.publish(CHANNEL_EVENTS, &payload.to_string());
   }

   /// Publish a statistics snapshot
   pub fn publish_stats(&self, stats: serde_json::Value) {
      let mut payload = json!({ "timestamp": Utc::now().to_rfc3339() });
      if let (Some(obj), Some(extra)) = (payload.as_object_mut(), stats.as_object()) {
         for (key, value) in extra {
            obj.insert(key.clone(), value.clone());
         }
      }
      self.publish(CHANNEL_STATS, &payload.to_string());
   }

   /// Mirror a structured log record
   pub fn publish_log(&self, record: serde_json::Value) {
      self.publish(CHANNEL_LOGS, &record.to_string());
   }
}
