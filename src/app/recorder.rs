use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::{QueryBuilder, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::device::{Device, Platform};
use crate::domain::notification::{
    Notification, NotificationMessage, NotificationPayload, TargetMode,
};
use crate::domain::recipient::{Recipient, RecipientStatus};
use crate::infra::db::Db;

/// Outcome of one delivery attempt, as the recorder persists it.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Sent,
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct RecipientAttempt {
    pub user_id: Uuid,
    pub device_id: Option<Uuid>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub tenant_id: Uuid,
    pub message: NotificationMessage,
    pub target_mode: TargetMode,
    pub target_user_ids: Vec<Uuid>,
    pub total_recipients: i32,
    pub scheduled_at: Option<OffsetDateTime>,
}

const NOTIFICATION_COLUMNS: &str = "id, tenant_id, sender_id, category, title, body, payload, \
     image_url, target_mode, target_user_ids, scheduled_at, sent_at, total_recipients, \
     sent_count, delivered_count, read_count, failed_count, created_at";

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let target_mode: String = row.get("target_mode");
    let target_mode = TargetMode::from_str(&target_mode)
        .ok_or_else(|| anyhow!("unknown target mode: {}", target_mode))?;
    let payload: NotificationPayload = serde_json::from_value(row.get("payload"))?;
    Ok(Notification {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        sender_id: row.get("sender_id"),
        category: row.get("category"),
        title: row.get("title"),
        body: row.get("body"),
        payload,
        image_url: row.get("image_url"),
        target_mode,
        target_user_ids: row.get("target_user_ids"),
        scheduled_at: row.get("scheduled_at"),
        sent_at: row.get("sent_at"),
        total_recipients: row.get("total_recipients"),
        sent_count: row.get("sent_count"),
        delivered_count: row.get("delivered_count"),
        read_count: row.get("read_count"),
        failed_count: row.get("failed_count"),
        created_at: row.get("created_at"),
    })
}

fn recipient_from_row(row: &PgRow) -> Result<Recipient> {
    let status: String = row.get("status");
    let status = RecipientStatus::from_str(&status)
        .ok_or_else(|| anyhow!("unknown recipient status: {}", status))?;
    Ok(Recipient {
        id: row.get("id"),
        notification_id: row.get("notification_id"),
        user_id: row.get("user_id"),
        device_id: row.get("device_id"),
        status,
        sent_at: row.get("sent_at"),
        delivered_at: row.get("delivered_at"),
        read_at: row.get("read_at"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
    })
}

/// Sole writer of Notification counters. Recipient rows are appended and
/// the parent counters bumped with relative increments, never
/// read-modify-write, so concurrent attempt writes stay correct.
#[derive(Clone)]
pub struct DeliveryRecorder {
    db: Db,
}

impl DeliveryRecorder {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert the parent Notification before any delivery attempt, fixing
    /// total_recipients for its lifetime.
    pub async fn create_notification(&self, new: NewNotification) -> Result<Notification> {
        let payload = serde_json::to_value(&new.message.payload)?;
        let row = sqlx::query(&format!(
            "INSERT INTO notifications \
                 (id, tenant_id, sender_id, category, title, body, payload, image_url, \
                  target_mode, target_user_ids, scheduled_at, total_recipients) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new.tenant_id)
        .bind(new.message.sender_id)
        .bind(new.message.payload.category())
        .bind(&new.message.title)
        .bind(&new.message.body)
        .bind(payload)
        .bind(&new.message.image_url)
        .bind(new.target_mode.as_str())
        .bind(&new.target_user_ids)
        .bind(new.scheduled_at)
        .bind(new.total_recipients)
        .fetch_one(self.db.pool())
        .await?;

        notification_from_row(&row)
    }

    pub async fn record_attempt(
        &self,
        notification_id: Uuid,
        attempt: RecipientAttempt,
    ) -> Result<Uuid> {
        let ids = self.record_attempts(notification_id, &[attempt]).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| anyhow!("recipient insert returned no id"))
    }

    /// Append one Recipient row per attempt and bump the parent counters in
    /// the same transaction. Returns the new recipient ids, positionally.
    pub async fn record_attempts(
        &self,
        notification_id: Uuid,
        attempts: &[RecipientAttempt],
    ) -> Result<Vec<Uuid>> {
        if attempts.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.db.pool().begin().await?;
        let mut ids = Vec::with_capacity(attempts.len());
        let mut sent: i32 = 0;
        let mut failed: i32 = 0;

        for attempt in attempts {
            let (status, sent_at, error_message) = match &attempt.outcome {
                AttemptOutcome::Sent => {
                    sent += 1;
                    (RecipientStatus::Sent, Some(OffsetDateTime::now_utc()), None)
                }
                AttemptOutcome::Failed { error } => {
                    failed += 1;
                    (RecipientStatus::Failed, None, Some(error.as_str()))
                }
            };

            let id: Uuid = sqlx::query_scalar(
                "INSERT INTO notification_recipients \
                     (id, notification_id, user_id, device_id, status, sent_at, error_message) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING id",
            )
            .bind(Uuid::new_v4())
            .bind(notification_id)
            .bind(attempt.user_id)
            .bind(attempt.device_id)
            .bind(status.as_str())
            .bind(sent_at)
            .bind(error_message)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        sqlx::query(
            "UPDATE notifications \
             SET sent_count = sent_count + $2, failed_count = failed_count + $3 \
             WHERE id = $1",
        )
        .bind(notification_id)
        .bind(sent)
        .bind(failed)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ids)
    }

    pub async fn mark_sent_at(&self, notification_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE notifications SET sent_at = now() WHERE id = $1 AND sent_at IS NULL")
            .bind(notification_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Transition the caller's recipient rows from sent to read. Counts one
    /// read per user regardless of how many of their devices were sent to.
    pub async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notification_recipients \
             SET status = 'read', read_at = now() \
             WHERE notification_id = $1 AND user_id = $2 AND status = 'sent'",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE notifications SET read_count = read_count + 1 WHERE id = $1")
            .bind(notification_id)
            .execute(self.db.pool())
            .await?;
        Ok(true)
    }

    /// Background-retry success path: failed -> sent for a single recipient.
    /// Counters keep their first-attempt tallies.
    pub async fn mark_retried_sent(&self, recipient_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notification_recipients \
             SET status = 'sent', sent_at = now(), error_message = NULL \
             WHERE id = $1 AND status = 'failed'",
        )
        .bind(recipient_id)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_notification(&self, notification_id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE id = $1",
            NOTIFICATION_COLUMNS
        ))
        .bind(notification_id)
        .fetch_optional(self.db.pool())
        .await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    /// Recipient plus its device row (if any), for the per-recipient retry.
    pub async fn get_recipient_with_device(
        &self,
        recipient_id: Uuid,
    ) -> Result<Option<(Recipient, Option<Device>)>> {
        let row = sqlx::query(
            "SELECT r.id, r.notification_id, r.user_id, r.device_id, r.status, r.sent_at, \
                    r.delivered_at, r.read_at, r.error_message, r.created_at, \
                    d.id AS d_id, d.user_id AS d_user_id, d.token AS d_token, \
                    d.platform AS d_platform, d.model AS d_model, \
                    d.app_version AS d_app_version, d.active AS d_active, \
                    d.last_used_at AS d_last_used_at, d.created_at AS d_created_at \
             FROM notification_recipients r \
             LEFT JOIN devices d ON d.id = r.device_id \
             WHERE r.id = $1",
        )
        .bind(recipient_id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let recipient = recipient_from_row(&row)?;

        let device = match row.get::<Option<Uuid>, _>("d_id") {
            Some(id) => {
                let platform: String = row.get("d_platform");
                let platform = Platform::from_str(&platform)
                    .ok_or_else(|| anyhow!("unknown platform: {}", platform))?;
                Some(Device {
                    id,
                    user_id: row.get("d_user_id"),
                    token: row.get("d_token"),
                    platform,
                    model: row.get("d_model"),
                    app_version: row.get("d_app_version"),
                    active: row.get("d_active"),
                    last_used_at: row.get("d_last_used_at"),
                    created_at: row.get("d_created_at"),
                })
            }
            None => None,
        };

        Ok(Some((recipient, device)))
    }

    /// Tenant-scoped history, newest first, cursor on (created_at, id).
    pub async fn list_for_tenant(
        &self,
        tenant_id: Uuid,
        category: Option<&str>,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {} FROM notifications WHERE tenant_id = ",
            NOTIFICATION_COLUMNS
        ));
        builder.push_bind(tenant_id);
        push_history_filters(&mut builder, category, cursor, limit);

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        rows.iter().map(notification_from_row).collect()
    }

    /// Notifications a user received, joined through their recipient rows.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        category: Option<&str>,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT DISTINCT n.id, n.tenant_id, n.sender_id, n.category, n.title, n.body, \
                    n.payload, n.image_url, n.target_mode, n.target_user_ids, n.scheduled_at, \
                    n.sent_at, n.total_recipients, n.sent_count, n.delivered_count, \
                    n.read_count, n.failed_count, n.created_at \
             FROM notifications n \
             JOIN notification_recipients r ON r.notification_id = n.id \
             WHERE r.user_id = "
        ));
        builder.push_bind(user_id);
        if let Some(category) = category {
            builder.push(" AND n.category = ");
            builder.push_bind(category.to_string());
        }
        if let Some((created_at, id)) = cursor {
            builder.push(" AND (n.created_at, n.id) < (");
            builder.push_bind(created_at);
            builder.push(", ");
            builder.push_bind(id);
            builder.push(")");
        }
        builder.push(" ORDER BY n.created_at DESC, n.id DESC LIMIT ");
        builder.push_bind(limit);

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        rows.iter().map(notification_from_row).collect()
    }
}

fn push_history_filters(
    builder: &mut QueryBuilder<'_, sqlx::Postgres>,
    category: Option<&str>,
    cursor: Option<(OffsetDateTime, Uuid)>,
    limit: i64,
) {
    if let Some(category) = category {
        builder.push(" AND category = ");
        builder.push_bind(category.to_string());
    }
    if let Some((created_at, id)) = cursor {
        builder.push(" AND (created_at, id) < (");
        builder.push_bind(created_at);
        builder.push(", ");
        builder.push_bind(id);
        builder.push(")");
    }
    builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    builder.push_bind(limit);
}
