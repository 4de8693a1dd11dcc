use anyhow::Result;
use sqlx::Row;
use time::{Date, Time};
use uuid::Uuid;

use crate::domain::user::User;
use crate::infra::db::Db;

/// A tenant with a recurring service, as the reminder generator sees it.
#[derive(Debug, Clone)]
pub struct ServiceSchedule {
    pub tenant_id: Uuid,
    pub service_name: String,
    pub service_time: Time,
}

#[derive(Debug, Clone)]
pub struct BirthdayMember {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub display_name: String,
}

/// Read-only view of the user/tenant directory the dispatch path consults.
#[derive(Clone)]
pub struct UserDirectory {
    db: Db,
}

impl UserDirectory {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, display_name, email, birth_date, active, created_at \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|row| User {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            display_name: row.get("display_name"),
            email: row.get("email"),
            birth_date: row.get("birth_date"),
            active: row.get("active"),
            created_at: row.get("created_at"),
        }))
    }

    pub async fn list_active_users_of_tenant(&self, tenant_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM users WHERE tenant_id = $1 AND active = true ORDER BY created_at",
        )
        .bind(tenant_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(ids)
    }

    /// Tenants whose weekly service falls on the given weekday (Postgres
    /// DOW: Sunday = 0).
    pub async fn tenants_with_service_on(&self, weekday: i16) -> Result<Vec<ServiceSchedule>> {
        let rows = sqlx::query(
            "SELECT id, service_name, service_time FROM tenants \
             WHERE service_day = $1 AND service_time IS NOT NULL",
        )
        .bind(weekday)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ServiceSchedule {
                tenant_id: row.get("id"),
                service_name: row.get("service_name"),
                service_time: row.get("service_time"),
            })
            .collect())
    }

    /// Active members whose birthday (month and day) matches the date.
    pub async fn members_with_birthday_on(&self, date: Date) -> Result<Vec<BirthdayMember>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, display_name FROM users \
             WHERE active = true \
               AND birth_date IS NOT NULL \
               AND EXTRACT(MONTH FROM birth_date) = $1 \
               AND EXTRACT(DAY FROM birth_date) = $2",
        )
        .bind(date.month() as i32)
        .bind(date.day() as i32)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BirthdayMember {
                user_id: row.get("id"),
                tenant_id: row.get("tenant_id"),
                display_name: row.get("display_name"),
            })
            .collect())
    }
}
