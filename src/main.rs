use anyhow::anyhow;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use steeple::app::devices::DeviceRegistry;
use steeple::app::directory::UserDirectory;
use steeple::app::dispatch::DispatchEngine;
use steeple::app::rate_limiter::RateLimiter;
use steeple::app::recorder::DeliveryRecorder;
use steeple::config::AppConfig;
use steeple::infra::{cache::RedisCache, db::Db, push::HttpPushClient, queue::QueueClient};
use steeple::{http, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    let cache = RedisCache::connect(&config.redis_url).await?;
    let queue = QueueClient::new(&config).await?;
    let push_timeout = Duration::from_millis(config.push_timeout_ms);
    let provider = Arc::new(HttpPushClient::new(
        &config.push_gateway_url,
        config.push_gateway_token.clone(),
        push_timeout,
    )?);

    let state = AppState {
        db,
        cache,
        queue,
        provider,
        admin_token: config.admin_token.clone(),
        dispatch_concurrency: config.dispatch_concurrency,
        push_timeout,
        send_rate_cap: config.send_rate_cap,
        send_rate_window_seconds: config.send_rate_window_seconds,
    };

    match config.app_mode.as_str() {
        "api" => {
            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "worker" => {
            tracing::info!("starting worker mode");
            let registry = DeviceRegistry::new(state.db.clone(), state.cache.clone());
            let recorder = DeliveryRecorder::new(state.db.clone());
            let directory = UserDirectory::new(state.db.clone());
            let engine = DispatchEngine::new(
                registry.clone(),
                RateLimiter::new(
                    state.cache.clone(),
                    state.send_rate_cap,
                    state.send_rate_window_seconds,
                ),
                recorder.clone(),
                directory.clone(),
                state.provider.clone(),
                state.queue.clone(),
                state.dispatch_concurrency,
                state.push_timeout,
            );

            tokio::select! {
                result = jobs::sender::run(
                    engine,
                    recorder,
                    state.provider.clone(),
                    state.queue.clone(),
                    state.push_timeout,
                ) => {
                    result?;
                }
                result = jobs::cleanup::run(registry) => {
                    result?;
                }
                result = jobs::reminders::run(state.db.clone(), directory, state.queue.clone()) => {
                    result?;
                }
                _ = shutdown_signal() => {}
            }
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
