use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    Individual,
    Group,
    TenantWide,
}

impl TargetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMode::Individual => "individual",
            TargetMode::Group => "group",
            TargetMode::TenantWide => "tenant_wide",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "individual" => Some(TargetMode::Individual),
            "group" => Some(TargetMode::Group),
            "tenant_wide" => Some(TargetMode::TenantWide),
            _ => None,
        }
    }
}

/// Structured per-category payload. The tag doubles as the notification's
/// `category` column so history queries can filter without inspecting JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    Announcement {
        topic: Option<String>,
    },
    ServiceReminder {
        service_name: String,
        #[serde(with = "time::serde::rfc3339")]
        starts_at: OffsetDateTime,
    },
    Birthday {
        member_name: String,
    },
    DonationReceipt {
        amount_cents: i64,
        currency: String,
    },
    Custom {
        data: serde_json::Value,
    },
}

impl NotificationPayload {
    pub fn category(&self) -> &'static str {
        match self {
            NotificationPayload::Announcement { .. } => "announcement",
            NotificationPayload::ServiceReminder { .. } => "service_reminder",
            NotificationPayload::Birthday { .. } => "birthday",
            NotificationPayload::DonationReceipt { .. } => "donation_receipt",
            NotificationPayload::Custom { .. } => "custom",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub category: String,
    pub title: String,
    pub body: String,
    pub payload: NotificationPayload,
    pub image_url: Option<String>,
    pub target_mode: TargetMode,
    pub target_user_ids: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub sent_at: Option<OffsetDateTime>,
    pub total_recipients: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub read_count: i32,
    pub failed_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The message half of a send request, before targeting is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    pub payload: NotificationPayload,
    pub image_url: Option<String>,
    pub sender_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn payload_tag_matches_category() {
        let payload = NotificationPayload::ServiceReminder {
            service_name: "Sunday Service".into(),
            starts_at: datetime!(2026-03-01 10:00 UTC),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "service_reminder");
        assert_eq!(payload.category(), "service_reminder");
    }

    #[test]
    fn payload_round_trips() {
        let payload = NotificationPayload::DonationReceipt {
            amount_cents: 12_500,
            currency: "USD".into(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: NotificationPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn unknown_payload_kind_is_rejected() {
        let err = serde_json::from_str::<NotificationPayload>(r#"{"kind":"telegram"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn target_mode_round_trips_through_str() {
        for mode in [
            TargetMode::Individual,
            TargetMode::Group,
            TargetMode::TenantWide,
        ] {
            assert_eq!(TargetMode::from_str(mode.as_str()), Some(mode));
        }
    }
}
