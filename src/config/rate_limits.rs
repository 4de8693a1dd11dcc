use std::time::{SystemTime, UNIX_EPOCH};

/// Bucket index for a fixed rate-limit window. Counters for consecutive
/// windows live under distinct keys, so expiry handles the slide.
pub fn current_window(window_seconds: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    window_bucket(now, window_seconds)
}

pub fn window_bucket(unix_seconds: u64, window_seconds: u64) -> u64 {
    unix_seconds / window_seconds.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_window_same_bucket() {
        assert_eq!(window_bucket(7200, 3600), window_bucket(7201, 3600));
        assert_eq!(window_bucket(7200, 3600), 2);
    }

    #[test]
    fn adjacent_windows_differ() {
        assert_ne!(window_bucket(3599, 3600), window_bucket(3600, 3600));
    }

    #[test]
    fn zero_window_does_not_panic() {
        assert_eq!(window_bucket(42, 0), 42);
    }
}
