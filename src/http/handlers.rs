use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::devices::DeviceRegistry;
use crate::app::directory::UserDirectory;
use crate::app::dispatch::{DispatchEngine, DispatchError, DispatchSummary};
use crate::app::preferences::PreferenceService;
use crate::app::rate_limiter::RateLimiter;
use crate::app::recorder::DeliveryRecorder;
use crate::domain::device::{Device, Platform};
use crate::domain::notification::{Notification, NotificationMessage, NotificationPayload};
use crate::domain::preference::Preference;
use crate::http::{AdminToken, AppError};
use crate::jobs::sender::{SendJob, SendTask};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(2, '/');
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

/// A page shorter than the limit is the last one; handing out a cursor
/// there would buy the client one guaranteed-empty request.
fn encode_cursor(items: &[Notification], limit: i64) -> Option<String> {
    if (items.len() as i64) < limit {
        return None;
    }
    let last = items.last()?;
    let timestamp = last.created_at.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, last.id))
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(20).clamp(1, 100)
}

fn dispatch_engine(state: &AppState) -> DispatchEngine {
    DispatchEngine::new(
        DeviceRegistry::new(state.db.clone(), state.cache.clone()),
        RateLimiter::new(
            state.cache.clone(),
            state.send_rate_cap,
            state.send_rate_window_seconds,
        ),
        DeliveryRecorder::new(state.db.clone()),
        UserDirectory::new(state.db.clone()),
        state.provider.clone(),
        state.queue.clone(),
        state.dispatch_concurrency,
        state.push_timeout,
    )
}

fn map_dispatch_error(err: DispatchError) -> AppError {
    match err {
        DispatchError::UserNotFound(id) => AppError::not_found(format!("user not found: {}", id)),
        DispatchError::Infra(err) => {
            tracing::error!(error = ?err, "dispatch failed");
            AppError::internal("failed to dispatch notification")
        }
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = state.db.ping().await.is_ok();
    let redis = state.cache.ping().await.is_ok();
    let status = if db && redis { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterDeviceRequest {
    pub user_id: Uuid,
    pub token: String,
    pub platform: Platform,
    pub model: Option<String>,
    pub app_version: Option<String>,
}

pub async fn register_device(
    State(state): State<AppState>,
    Json(payload): Json<RegisterDeviceRequest>,
) -> Result<Json<Device>, AppError> {
    if payload.token.trim().is_empty() {
        return Err(AppError::bad_request("device token must not be empty"));
    }

    let registry = DeviceRegistry::new(state.db.clone(), state.cache.clone());
    let device = registry
        .register(
            payload.user_id,
            payload.token.trim(),
            payload.platform,
            payload.model,
            payload.app_version,
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "device registration failed");
            AppError::internal("failed to register device")
        })?;

    Ok(Json(device))
}

#[derive(Deserialize)]
pub struct UnregisterDeviceRequest {
    pub token: String,
}

pub async fn unregister_device(
    State(state): State<AppState>,
    Json(payload): Json<UnregisterDeviceRequest>,
) -> Result<StatusCode, AppError> {
    let registry = DeviceRegistry::new(state.db.clone(), state.cache.clone());
    registry.unregister(&payload.token).await.map_err(|err| {
        tracing::error!(error = ?err, "device unregister failed");
        AppError::internal("failed to unregister device")
    })?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Sends
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct MessageBody {
    pub title: String,
    pub body: String,
    pub payload: NotificationPayload,
    pub image_url: Option<String>,
    pub sender_id: Option<Uuid>,
}

impl MessageBody {
    fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::bad_request("title must not be empty"));
        }
        if self.body.trim().is_empty() {
            return Err(AppError::bad_request("body must not be empty"));
        }
        Ok(())
    }

    fn into_message(self) -> NotificationMessage {
        NotificationMessage {
            title: self.title,
            body: self.body,
            payload: self.payload,
            image_url: self.image_url,
            sender_id: self.sender_id,
        }
    }
}

#[derive(Serialize)]
pub struct EnqueuedResponse {
    pub enqueued: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum SendResponse {
    Summary(DispatchSummary),
    Enqueued(EnqueuedResponse),
}

async fn enqueue_job(state: &AppState, job: SendJob) -> Result<(StatusCode, Json<SendResponse>), AppError> {
    let task = SendTask { attempt: 0, job };
    state.queue.enqueue_task(&task, 0).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to enqueue send task");
        AppError::internal("failed to enqueue send task")
    })?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SendResponse::Enqueued(EnqueuedResponse { enqueued: true })),
    ))
}

#[derive(Deserialize)]
pub struct SendToUserRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub message: MessageBody,
    #[serde(default)]
    pub enqueue: bool,
}

pub async fn send_to_user(
    State(state): State<AppState>,
    _admin: AdminToken,
    Json(payload): Json<SendToUserRequest>,
) -> Result<(StatusCode, Json<SendResponse>), AppError> {
    payload.message.validate()?;
    let message = payload.message.into_message();

    if payload.enqueue {
        return enqueue_job(
            &state,
            SendJob::User {
                user_id: payload.user_id,
                message,
            },
        )
        .await;
    }

    let summary = dispatch_engine(&state)
        .send_to_user(payload.user_id, message)
        .await
        .map_err(map_dispatch_error)?;
    Ok((StatusCode::OK, Json(SendResponse::Summary(summary))))
}

#[derive(Deserialize)]
pub struct SendToUsersRequest {
    pub tenant_id: Uuid,
    pub user_ids: Vec<Uuid>,
    #[serde(flatten)]
    pub message: MessageBody,
    #[serde(default)]
    pub enqueue: bool,
}

pub async fn send_to_users(
    State(state): State<AppState>,
    _admin: AdminToken,
    Json(payload): Json<SendToUsersRequest>,
) -> Result<(StatusCode, Json<SendResponse>), AppError> {
    payload.message.validate()?;
    if payload.user_ids.is_empty() {
        return Err(AppError::bad_request("user_ids must not be empty"));
    }
    let message = payload.message.into_message();

    if payload.enqueue {
        return enqueue_job(
            &state,
            SendJob::Users {
                tenant_id: payload.tenant_id,
                user_ids: payload.user_ids,
                message,
            },
        )
        .await;
    }

    let summary = dispatch_engine(&state)
        .send_to_multiple_users(payload.tenant_id, &payload.user_ids, message)
        .await
        .map_err(map_dispatch_error)?;
    Ok((StatusCode::OK, Json(SendResponse::Summary(summary))))
}

#[derive(Deserialize)]
pub struct SendToTenantRequest {
    pub tenant_id: Uuid,
    #[serde(flatten)]
    pub message: MessageBody,
    #[serde(default)]
    pub enqueue: bool,
}

pub async fn send_to_tenant(
    State(state): State<AppState>,
    _admin: AdminToken,
    Json(payload): Json<SendToTenantRequest>,
) -> Result<(StatusCode, Json<SendResponse>), AppError> {
    payload.message.validate()?;
    let message = payload.message.into_message();

    if payload.enqueue {
        return enqueue_job(
            &state,
            SendJob::Tenant {
                tenant_id: payload.tenant_id,
                message,
            },
        )
        .await;
    }

    let summary = dispatch_engine(&state)
        .send_to_tenant(payload.tenant_id, message)
        .await
        .map_err(map_dispatch_error)?;
    Ok((StatusCode::OK, Json(SendResponse::Summary(summary))))
}

// ---------------------------------------------------------------------------
// Read receipts and history
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct MarkReadRequest {
    pub user_id: Uuid,
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub updated: bool,
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Json(payload): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let recorder = DeliveryRecorder::new(state.db.clone());
    let updated = recorder
        .mark_read(notification_id, payload.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "mark read failed");
            AppError::internal("failed to mark notification read")
        })?;
    Ok(Json(MarkReadResponse { updated }))
}

pub async fn list_tenant_notifications(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ListResponse<Notification>>, AppError> {
    let cursor = parse_cursor(query.cursor)?;
    let limit = clamp_limit(query.limit);
    let recorder = DeliveryRecorder::new(state.db.clone());
    let items = recorder
        .list_for_tenant(tenant_id, query.category.as_deref(), cursor, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "tenant history query failed");
            AppError::internal("failed to list notifications")
        })?;

    let next_cursor = encode_cursor(&items, limit);
    Ok(Json(ListResponse { items, next_cursor }))
}

pub async fn list_user_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ListResponse<Notification>>, AppError> {
    let cursor = parse_cursor(query.cursor)?;
    let limit = clamp_limit(query.limit);
    let recorder = DeliveryRecorder::new(state.db.clone());
    let items = recorder
        .list_for_user(user_id, query.category.as_deref(), cursor, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "user history query failed");
            AppError::internal("failed to list notifications")
        })?;

    let next_cursor = encode_cursor(&items, limit);
    Ok(Json(ListResponse { items, next_cursor }))
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

pub async fn get_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Preference>, AppError> {
    let service = PreferenceService::new(state.db.clone());
    let preference = service.get_or_default(user_id).await.map_err(|err| {
        tracing::error!(error = ?err, "preference read failed");
        AppError::internal("failed to load preferences")
    })?;
    Ok(Json(preference))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(mut payload): Json<Preference>,
) -> Result<Json<Preference>, AppError> {
    // The path, not the body, decides whose preferences change.
    payload.user_id = user_id;
    let service = PreferenceService::new(state.db.clone());
    let preference = service.update(&payload).await.map_err(|err| {
        tracing::error!(error = ?err, "preference update failed");
        AppError::internal("failed to update preferences")
    })?;
    Ok(Json(preference))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::TargetMode;
    use time::macros::datetime;

    fn notification(created_at: OffsetDateTime) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            sender_id: None,
            category: "announcement".into(),
            title: "t".into(),
            body: "b".into(),
            payload: NotificationPayload::Announcement { topic: None },
            image_url: None,
            target_mode: TargetMode::TenantWide,
            target_user_ids: Vec::new(),
            scheduled_at: None,
            sent_at: None,
            total_recipients: 0,
            sent_count: 0,
            delivered_count: 0,
            read_count: 0,
            failed_count: 0,
            created_at,
        }
    }

    #[test]
    fn full_page_yields_a_cursor_that_parses_back() {
        let items: Vec<Notification> = (0..3)
            .map(|_| notification(datetime!(2026-08-01 12:00 UTC)))
            .collect();

        let cursor = encode_cursor(&items, 3).expect("full page should paginate");
        let (timestamp, id) = parse_cursor(Some(cursor)).unwrap().unwrap();
        assert_eq!(timestamp, items[2].created_at);
        assert_eq!(id, items[2].id);
    }

    #[test]
    fn short_page_ends_pagination() {
        let items = vec![notification(datetime!(2026-08-01 12:00 UTC))];
        assert_eq!(encode_cursor(&items, 20), None);
        assert_eq!(encode_cursor(&[], 20), None);
    }

    #[test]
    fn malformed_cursors_are_rejected() {
        assert!(parse_cursor(Some("not-a-cursor".into())).is_err());
        assert!(parse_cursor(Some("2026-08-01T12:00:00Z/not-a-uuid".into())).is_err());
        assert!(parse_cursor(None).unwrap().is_none());
    }

    #[test]
    fn limits_are_clamped_to_the_page_bounds() {
        assert_eq!(clamp_limit(None), 20);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), 100);
    }
}
