use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::preference::Preference;
use crate::infra::db::Db;

fn preference_from_row(row: &PgRow) -> Preference {
    Preference {
        user_id: row.get("user_id"),
        announcements: row.get("announcements"),
        service_reminders: row.get("service_reminders"),
        birthdays: row.get("birthdays"),
        donation_receipts: row.get("donation_receipts"),
        dnd_enabled: row.get("dnd_enabled"),
        dnd_start: row.get("dnd_start"),
        dnd_end: row.get("dnd_end"),
        push_enabled: row.get("push_enabled"),
        email_enabled: row.get("email_enabled"),
        sms_enabled: row.get("sms_enabled"),
    }
}

const PREFERENCE_COLUMNS: &str = "user_id, announcements, service_reminders, birthdays, \
     donation_receipts, dnd_enabled, dnd_start, dnd_end, push_enabled, email_enabled, \
     sms_enabled";

#[derive(Clone)]
pub struct PreferenceService {
    db: Db,
}

impl PreferenceService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Read a user's preferences, creating the row with defaults on first
    /// access.
    pub async fn get_or_default(&self, user_id: Uuid) -> Result<Preference> {
        if let Some(row) = sqlx::query(&format!(
            "SELECT {} FROM notification_preferences WHERE user_id = $1",
            PREFERENCE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?
        {
            return Ok(preference_from_row(&row));
        }

        let defaults = Preference::default_for(user_id);
        // A concurrent first read may win the insert; re-read either way.
        sqlx::query(
            "INSERT INTO notification_preferences \
                 (user_id, announcements, service_reminders, birthdays, donation_receipts, \
                  dnd_enabled, dnd_start, dnd_end, push_enabled, email_enabled, sms_enabled) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(defaults.user_id)
        .bind(defaults.announcements)
        .bind(defaults.service_reminders)
        .bind(defaults.birthdays)
        .bind(defaults.donation_receipts)
        .bind(defaults.dnd_enabled)
        .bind(defaults.dnd_start)
        .bind(defaults.dnd_end)
        .bind(defaults.push_enabled)
        .bind(defaults.email_enabled)
        .bind(defaults.sms_enabled)
        .execute(self.db.pool())
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM notification_preferences WHERE user_id = $1",
            PREFERENCE_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(preference_from_row(&row))
    }

    pub async fn update(&self, preference: &Preference) -> Result<Preference> {
        let row = sqlx::query(&format!(
            "INSERT INTO notification_preferences \
                 (user_id, announcements, service_reminders, birthdays, donation_receipts, \
                  dnd_enabled, dnd_start, dnd_end, push_enabled, email_enabled, sms_enabled) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 announcements = EXCLUDED.announcements, \
                 service_reminders = EXCLUDED.service_reminders, \
                 birthdays = EXCLUDED.birthdays, \
                 donation_receipts = EXCLUDED.donation_receipts, \
                 dnd_enabled = EXCLUDED.dnd_enabled, \
                 dnd_start = EXCLUDED.dnd_start, \
                 dnd_end = EXCLUDED.dnd_end, \
                 push_enabled = EXCLUDED.push_enabled, \
                 email_enabled = EXCLUDED.email_enabled, \
                 sms_enabled = EXCLUDED.sms_enabled \
             RETURNING {}",
            PREFERENCE_COLUMNS
        ))
        .bind(preference.user_id)
        .bind(preference.announcements)
        .bind(preference.service_reminders)
        .bind(preference.birthdays)
        .bind(preference.donation_receipts)
        .bind(preference.dnd_enabled)
        .bind(preference.dnd_start)
        .bind(preference.dnd_end)
        .bind(preference.push_enabled)
        .bind(preference.email_enabled)
        .bind(preference.sms_enabled)
        .fetch_one(self.db.pool())
        .await?;

        Ok(preference_from_row(&row))
    }
}
