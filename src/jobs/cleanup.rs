use anyhow::Result;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::app::devices::DeviceRegistry;

/// Devices unused for this long are considered dead installations.
pub const STALE_AFTER_DAYS: i64 = 90;
const SWEEP_INTERVAL_SECONDS: u64 = 3600;

pub fn stale_cutoff(now: OffsetDateTime) -> OffsetDateTime {
    now - time::Duration::days(STALE_AFTER_DAYS)
}

/// Hourly sweep deactivating stale devices and evicting their cached
/// tokens. The deactivation UPDATE is guarded on `active`, so a repeat run
/// over the same rows is a no-op.
pub async fn run(registry: DeviceRegistry) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECONDS));
    info!("device cleanup job started");
    loop {
        ticker.tick().await;
        match registry
            .deactivate_idle_since(stale_cutoff(OffsetDateTime::now_utc()))
            .await
        {
            Ok(0) => {}
            Ok(count) => info!(count = count, "deactivated stale devices"),
            Err(err) => warn!(error = ?err, "stale device sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn cutoff_is_ninety_days_back() {
        let now = datetime!(2026-06-01 00:00 UTC);
        assert_eq!(stale_cutoff(now), datetime!(2026-03-03 00:00 UTC));
    }
}
