use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::Sent => "sent",
            RecipientStatus::Delivered => "delivered",
            RecipientStatus::Read => "read",
            RecipientStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RecipientStatus::Pending),
            "sent" => Some(RecipientStatus::Sent),
            "delivered" => Some(RecipientStatus::Delivered),
            "read" => Some(RecipientStatus::Read),
            "failed" => Some(RecipientStatus::Failed),
            _ => None,
        }
    }

    /// Legal transitions: pending -> sent -> delivered -> read, pending ->
    /// failed, and failed -> sent (background retry succeeded).
    pub fn can_transition_to(&self, next: RecipientStatus) -> bool {
        use RecipientStatus::*;
        matches!(
            (self, next),
            (Pending, Sent)
                | (Pending, Failed)
                | (Sent, Delivered)
                | (Sent, Read)
                | (Delivered, Read)
                | (Failed, Sent)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub user_id: Uuid,
    /// None when the user had no registered device to attempt.
    pub device_id: Option<Uuid>,
    pub status: RecipientStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub sent_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub delivered_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::RecipientStatus::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        assert!(Pending.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Read));
        assert!(Sent.can_transition_to(Read));
    }

    #[test]
    fn failure_and_retry_transitions() {
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Sent));
        assert!(!Failed.can_transition_to(Read));
    }

    #[test]
    fn terminal_states_do_not_regress() {
        assert!(!Read.can_transition_to(Sent));
        assert!(!Read.can_transition_to(Pending));
        assert!(!Sent.can_transition_to(Pending));
        assert!(!Sent.can_transition_to(Failed));
    }
}
