use axum::{routing::get, routing::post, routing::put, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn devices() -> Router<AppState> {
    Router::new()
        .route("/devices", post(handlers::register_device))
        .route("/devices/unregister", post(handlers::unregister_device))
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route(
            "/notifications/send/user",
            post(handlers::send_to_user),
        )
        .route(
            "/notifications/send/users",
            post(handlers::send_to_users),
        )
        .route(
            "/notifications/send/tenant",
            post(handlers::send_to_tenant),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route(
            "/tenants/:id/notifications",
            get(handlers::list_tenant_notifications),
        )
        .route(
            "/users/:id/notifications",
            get(handlers::list_user_notifications),
        )
}

pub fn preferences() -> Router<AppState> {
    Router::new()
        .route("/users/:id/preferences", get(handlers::get_preferences))
        .route("/users/:id/preferences", put(handlers::update_preferences))
}
