pub mod devices;
pub mod directory;
pub mod dispatch;
pub mod preferences;
pub mod rate_limiter;
pub mod recorder;
