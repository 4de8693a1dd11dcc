use anyhow::Result;
use redis::AsyncCommands;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::device::{Device, Platform};
use crate::infra::cache::RedisCache;
use crate::infra::db::Db;

/// Cached token sets go stale on their own if nothing refreshes them.
const TOKEN_CACHE_TTL_SECONDS: i64 = 86_400;

/// Owns the user -> active device token mapping. Writes go to Postgres
/// first; the Redis token set is a lookup accelerator and every cache
/// failure degrades to the durable store instead of failing the caller.
#[derive(Clone)]
pub struct DeviceRegistry {
    db: Db,
    cache: RedisCache,
}

fn token_set_key(user_id: Uuid) -> String {
    format!("devices:{}", user_id)
}

fn device_from_row(row: &PgRow) -> Result<Device> {
    let platform: String = row.get("platform");
    let platform = Platform::from_str(&platform)
        .ok_or_else(|| anyhow::anyhow!("unknown platform: {}", platform))?;
    Ok(Device {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token: row.get("token"),
        platform,
        model: row.get("model"),
        app_version: row.get("app_version"),
        active: row.get("active"),
        last_used_at: row.get("last_used_at"),
        created_at: row.get("created_at"),
    })
}

const DEVICE_COLUMNS: &str =
    "id, user_id, token, platform, model, app_version, active, last_used_at, created_at";

/// A cached token can outlive a re-registration that handed the device to
/// another user. Rows that no longer belong to the requested user are split
/// out so the caller can evict them instead of sending through them.
fn split_owned(devices: Vec<Device>, user_id: Uuid) -> (Vec<Device>, Vec<String>) {
    let mut owned = Vec::new();
    let mut stale = Vec::new();
    for device in devices {
        if device.user_id == user_id {
            owned.push(device);
        } else {
            stale.push(device.token);
        }
    }
    (owned, stale)
}

impl DeviceRegistry {
    pub fn new(db: Db, cache: RedisCache) -> Self {
        Self { db, cache }
    }

    /// Upsert by token. An existing token is re-associated with the
    /// presenting user, its metadata refreshed and the device reactivated.
    pub async fn register(
        &self,
        user_id: Uuid,
        token: &str,
        platform: Platform,
        model: Option<String>,
        app_version: Option<String>,
    ) -> Result<Device> {
        let previous_owner: Option<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM devices WHERE token = $1")
                .bind(token)
                .fetch_optional(self.db.pool())
                .await?;

        let row = sqlx::query(&format!(
            "INSERT INTO devices (id, user_id, token, platform, model, app_version, active, last_used_at) \
             VALUES ($1, $2, $3, $4, $5, $6, true, now()) \
             ON CONFLICT (token) DO UPDATE SET \
                 user_id = EXCLUDED.user_id, \
                 platform = EXCLUDED.platform, \
                 model = COALESCE(EXCLUDED.model, devices.model), \
                 app_version = COALESCE(EXCLUDED.app_version, devices.app_version), \
                 active = true, \
                 last_used_at = now() \
             RETURNING {}",
            DEVICE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token)
        .bind(platform.as_str())
        .bind(model)
        .bind(app_version)
        .fetch_one(self.db.pool())
        .await?;

        let device = device_from_row(&row)?;

        if let Some(previous) = previous_owner {
            if previous != user_id {
                self.evict_cached_token(previous, token).await;
            }
        }
        self.publish_token(user_id, token).await;

        Ok(device)
    }

    /// Deactivate the device matching the token. Unknown tokens are a no-op.
    pub async fn unregister(&self, token: &str) -> Result<()> {
        let owner: Option<Uuid> = sqlx::query_scalar(
            "UPDATE devices SET active = false WHERE token = $1 RETURNING user_id",
        )
        .bind(token)
        .fetch_optional(self.db.pool())
        .await?;

        if let Some(user_id) = owner {
            self.evict_cached_token(user_id, token).await;
        }
        Ok(())
    }

    /// Cache-first lookup of a user's active devices. An empty or
    /// unavailable cache set falls back to the durable store and, on
    /// success, repopulates the cache.
    pub async fn active_devices_for(&self, user_id: Uuid) -> Result<Vec<Device>> {
        if let Some(tokens) = self.cached_tokens(user_id).await {
            if !tokens.is_empty() {
                let rows = sqlx::query(&format!(
                    "SELECT {} FROM devices WHERE token = ANY($1) AND active = true",
                    DEVICE_COLUMNS
                ))
                .bind(&tokens)
                .fetch_all(self.db.pool())
                .await?;
                let devices: Result<Vec<_>> = rows.iter().map(device_from_row).collect();
                let (owned, stale) = split_owned(devices?, user_id);
                for token in &stale {
                    self.evict_cached_token(user_id, token).await;
                }
                if !owned.is_empty() {
                    return Ok(owned);
                }
                // The cached set no longer matches any active row of this user.
                self.drop_token_set(user_id).await;
            }
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM devices WHERE user_id = $1 AND active = true",
            DEVICE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;
        let devices: Result<Vec<_>> = rows.iter().map(device_from_row).collect();
        let devices = devices?;

        for device in &devices {
            self.publish_token(user_id, &device.token).await;
        }
        Ok(devices)
    }

    /// One batched lookup for a multi-user fan-out. Users without active
    /// devices are simply absent from the returned map.
    pub async fn active_devices_for_many(
        &self,
        user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<Device>>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM devices WHERE user_id = ANY($1) AND active = true",
            DEVICE_COLUMNS
        ))
        .bind(user_ids)
        .fetch_all(self.db.pool())
        .await?;

        let mut by_user: HashMap<Uuid, Vec<Device>> = HashMap::new();
        for row in &rows {
            let device = device_from_row(row)?;
            by_user.entry(device.user_id).or_default().push(device);
        }
        Ok(by_user)
    }

    /// Deactivate devices idle since before the cutoff and evict their
    /// cached tokens. Returns how many devices were deactivated; a repeat
    /// run matches nothing.
    pub async fn deactivate_idle_since(&self, cutoff: OffsetDateTime) -> Result<u64> {
        let rows = sqlx::query(
            "UPDATE devices SET active = false \
             WHERE active = true AND last_used_at < $1 \
             RETURNING user_id, token",
        )
        .bind(cutoff)
        .fetch_all(self.db.pool())
        .await?;

        for row in &rows {
            let user_id: Uuid = row.get("user_id");
            let token: String = row.get("token");
            self.evict_cached_token(user_id, &token).await;
        }
        Ok(rows.len() as u64)
    }

    async fn cached_tokens(&self, user_id: Uuid) -> Option<Vec<String>> {
        let mut conn = match self.cache.connection().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(error = ?err, "device cache unavailable, using durable store");
                return None;
            }
        };
        match conn.smembers::<_, Vec<String>>(token_set_key(user_id)).await {
            Ok(tokens) => Some(tokens),
            Err(err) => {
                tracing::warn!(error = ?err, user_id = %user_id, "device cache read failed");
                None
            }
        }
    }

    async fn publish_token(&self, user_id: Uuid, token: &str) {
        let key = token_set_key(user_id);
        let result: Result<()> = async {
            let mut conn = self.cache.connection().await?;
            let _: () = conn.sadd(&key, token).await?;
            let _: () = conn.expire(&key, TOKEN_CACHE_TTL_SECONDS).await?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(error = ?err, user_id = %user_id, "failed to publish device token");
        }
    }

    async fn evict_cached_token(&self, user_id: Uuid, token: &str) {
        let result: Result<()> = async {
            let mut conn = self.cache.connection().await?;
            let _: () = conn.srem(token_set_key(user_id), token).await?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(error = ?err, user_id = %user_id, "failed to evict device token");
        }
    }

    async fn drop_token_set(&self, user_id: Uuid) {
        let result: Result<()> = async {
            let mut conn = self.cache.connection().await?;
            let _: () = conn.del(token_set_key(user_id)).await?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(error = ?err, user_id = %user_id, "failed to drop device token set");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(user_id: Uuid, token: &str) -> Device {
        Device {
            id: Uuid::new_v4(),
            user_id,
            token: token.into(),
            platform: Platform::Ios,
            model: None,
            app_version: None,
            active: true,
            last_used_at: OffsetDateTime::now_utc(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn token_reassigned_to_another_user_is_never_served_from_a_stale_set() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        // Alice's cached set still holds "shared" after Bob re-registered it.
        let rows = vec![device(alice, "mine"), device(bob, "shared")];

        let (owned, stale) = split_owned(rows, alice);

        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].token, "mine");
        assert!(owned.iter().all(|d| d.user_id == alice));
        assert_eq!(stale, vec!["shared".to_string()]);
    }

    #[test]
    fn fully_stale_set_leaves_nothing_owned() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let rows = vec![device(bob, "taken")];

        let (owned, stale) = split_owned(rows, alice);

        assert!(owned.is_empty());
        assert_eq!(stale.len(), 1);
    }
}
