use redis::AsyncCommands;
use uuid::Uuid;

use crate::config::rate_limits::current_window;
use crate::infra::cache::RedisCache;

/// Fixed-window per-user send counter backed by Redis. Window slide comes
/// from bucketed keys plus TTL expiry; INCR keeps concurrent senders
/// atomic without any application-level locking.
#[derive(Clone)]
pub struct RateLimiter {
    cache: RedisCache,
    cap: u32,
    window_seconds: u64,
}

impl RateLimiter {
    pub fn new(cache: RedisCache, cap: u32, window_seconds: u64) -> Self {
        Self {
            cache,
            cap,
            window_seconds,
        }
    }

    /// Whether this user may be sent another notification right now. Counts
    /// the attempt. A `false` never raises; Redis outages fail open so a
    /// cache incident cannot halt delivery.
    pub async fn allow(&self, user_id: Uuid) -> bool {
        let key = format!(
            "notifyrate:{}:{}",
            user_id,
            current_window(self.window_seconds)
        );

        let outcome: anyhow::Result<u32> = async {
            let mut conn = self.cache.connection().await?;
            let count: u32 = conn.incr(&key, 1).await?;
            if count == 1 {
                let _: () = conn.expire(&key, self.window_seconds as i64).await?;
            }
            Ok(count)
        }
        .await;

        match outcome {
            Ok(count) if count > self.cap => {
                tracing::debug!(
                    user_id = %user_id,
                    count = count,
                    cap = self.cap,
                    "send rate limit exceeded"
                );
                false
            }
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = ?err, user_id = %user_id, "rate limiter unavailable, allowing send");
                true
            }
        }
    }
}
