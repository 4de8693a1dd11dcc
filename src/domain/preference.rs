use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, Time};
use uuid::Uuid;

/// Per-user notification preferences. One row per user, created lazily with
/// defaults on first read. The dispatch path currently records and exposes
/// these but does not gate sends on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub user_id: Uuid,
    pub announcements: bool,
    pub service_reminders: bool,
    pub birthdays: bool,
    pub donation_receipts: bool,
    pub dnd_enabled: bool,
    pub dnd_start: Time,
    pub dnd_end: Time,
    pub push_enabled: bool,
    pub email_enabled: bool,
    pub sms_enabled: bool,
}

impl Preference {
    /// Default preferences for a user, used when no row exists yet.
    pub fn default_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            announcements: true,
            service_reminders: true,
            birthdays: true,
            donation_receipts: true,
            dnd_enabled: false,
            dnd_start: Time::from_hms(22, 0, 0).unwrap_or(Time::MIDNIGHT),
            dnd_end: Time::from_hms(7, 0, 0).unwrap_or(Time::MIDNIGHT),
            push_enabled: true,
            email_enabled: true,
            sms_enabled: false,
        }
    }

    /// Whether the do-not-disturb window covers the given instant. Windows
    /// may cross midnight (22:00 to 07:00).
    pub fn dnd_active_at(&self, at: OffsetDateTime) -> bool {
        if !self.dnd_enabled {
            return false;
        }
        let now = at.time();
        if self.dnd_start <= self.dnd_end {
            now >= self.dnd_start && now < self.dnd_end
        } else {
            now >= self.dnd_start || now < self.dnd_end
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn prefs_with_window(start: Time, end: Time) -> Preference {
        let mut prefs = Preference::default_for(Uuid::new_v4());
        prefs.dnd_enabled = true;
        prefs.dnd_start = start;
        prefs.dnd_end = end;
        prefs
    }

    #[test]
    fn dnd_disabled_never_matches() {
        let prefs = Preference::default_for(Uuid::new_v4());
        assert!(!prefs.dnd_active_at(datetime!(2026-01-01 23:00 UTC)));
    }

    #[test]
    fn dnd_window_within_one_day() {
        let prefs = prefs_with_window(
            Time::from_hms(13, 0, 0).unwrap(),
            Time::from_hms(15, 0, 0).unwrap(),
        );
        assert!(prefs.dnd_active_at(datetime!(2026-01-01 14:00 UTC)));
        assert!(!prefs.dnd_active_at(datetime!(2026-01-01 16:00 UTC)));
    }

    #[test]
    fn dnd_window_crossing_midnight() {
        let prefs = prefs_with_window(
            Time::from_hms(22, 0, 0).unwrap(),
            Time::from_hms(7, 0, 0).unwrap(),
        );
        assert!(prefs.dnd_active_at(datetime!(2026-01-01 23:30 UTC)));
        assert!(prefs.dnd_active_at(datetime!(2026-01-02 6:59 UTC)));
        assert!(!prefs.dnd_active_at(datetime!(2026-01-02 12:00 UTC)));
    }
}
