pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use std::sync::Arc;
use std::time::Duration;

use crate::infra::{cache::RedisCache, db::Db, push::PushProvider, queue::QueueClient};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cache: RedisCache,
    pub queue: QueueClient,
    pub provider: Arc<dyn PushProvider>,
    pub admin_token: Option<String>,
    pub dispatch_concurrency: usize,
    pub push_timeout: Duration,
    pub send_rate_cap: u32,
    pub send_rate_window_seconds: u64,
}
