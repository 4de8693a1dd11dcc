use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// A member of a tenant (church). The wider member-management surface is
/// plain CRUD; the dispatch path only needs identity, tenancy and liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    pub birth_date: Option<Date>,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
