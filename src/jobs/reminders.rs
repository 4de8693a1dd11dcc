use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::directory::{BirthdayMember, ServiceSchedule, UserDirectory};
use crate::domain::notification::{NotificationMessage, NotificationPayload};
use crate::infra::db::Db;
use crate::infra::queue::QueueClient;
use crate::jobs::sender::{SendJob, SendTask};

const CHECK_INTERVAL_SECONDS: u64 = 900;

/// Time-driven notification producers. They compute an audience and enqueue
/// ordinary send tasks; the dispatch engine treats them like any other
/// caller. A `reminder_runs` marker row makes each (tenant, kind, day)
/// fire at most once; a marker is released again when enqueueing fails so
/// the next tick retries the tenant instead of losing the day.
pub async fn run(db: Db, directory: UserDirectory, queue: QueueClient) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(CHECK_INTERVAL_SECONDS));
    info!("reminder generator started");
    loop {
        ticker.tick().await;
        let today = OffsetDateTime::now_utc().date();

        if let Err(err) = generate_service_reminders(&db, &directory, &queue, today).await {
            warn!(error = ?err, "service reminder generation failed");
        }
        if let Err(err) = generate_birthday_notices(&db, &directory, &queue, today).await {
            warn!(error = ?err, "birthday notice generation failed");
        }
    }
}

fn service_reminder_task(schedule: &ServiceSchedule, today: Date) -> SendTask {
    let starts_at = PrimitiveDateTime::new(today, schedule.service_time).assume_utc();
    SendTask {
        attempt: 0,
        job: SendJob::Tenant {
            tenant_id: schedule.tenant_id,
            message: NotificationMessage {
                title: schedule.service_name.clone(),
                body: format!("{} starts today. See you there!", schedule.service_name),
                payload: NotificationPayload::ServiceReminder {
                    service_name: schedule.service_name.clone(),
                    starts_at,
                },
                image_url: None,
                sender_id: None,
            },
        },
    }
}

fn birthday_task(member: &BirthdayMember) -> SendTask {
    SendTask {
        attempt: 0,
        job: SendJob::User {
            user_id: member.user_id,
            message: NotificationMessage {
                title: "Happy Birthday!".into(),
                body: format!(
                    "Happy birthday, {}! We are glad you are part of us.",
                    member.display_name
                ),
                payload: NotificationPayload::Birthday {
                    member_name: member.display_name.clone(),
                },
                image_url: None,
                sender_id: None,
            },
        },
    }
}

fn group_by_tenant(members: Vec<BirthdayMember>) -> HashMap<Uuid, Vec<BirthdayMember>> {
    let mut by_tenant: HashMap<Uuid, Vec<BirthdayMember>> = HashMap::new();
    for member in members {
        by_tenant.entry(member.tenant_id).or_default().push(member);
    }
    by_tenant
}

async fn generate_service_reminders(
    db: &Db,
    directory: &UserDirectory,
    queue: &QueueClient,
    today: Date,
) -> Result<()> {
    // Postgres DOW convention: Sunday = 0.
    let weekday = today.weekday().number_days_from_sunday() as i16;

    for schedule in directory.tenants_with_service_on(weekday).await? {
        if !claim_run(db, schedule.tenant_id, "service_reminder", today).await? {
            continue;
        }

        let task = service_reminder_task(&schedule, today);
        // One tenant's enqueue failure must not starve the rest of the
        // pass; the released marker lets the next tick retry this one.
        match queue.enqueue_task(&task, 0).await {
            Ok(()) => {
                info!(tenant_id = %schedule.tenant_id, "enqueued weekly service reminder");
            }
            Err(err) => {
                warn!(
                    error = ?err,
                    tenant_id = %schedule.tenant_id,
                    "failed to enqueue service reminder, releasing marker"
                );
                release_run(db, schedule.tenant_id, "service_reminder", today).await;
            }
        }
    }

    Ok(())
}

async fn generate_birthday_notices(
    db: &Db,
    directory: &UserDirectory,
    queue: &QueueClient,
    today: Date,
) -> Result<()> {
    let members = directory.members_with_birthday_on(today).await?;
    if members.is_empty() {
        return Ok(());
    }

    let total = members.len();
    let mut enqueued = 0;
    for (tenant_id, members) in group_by_tenant(members) {
        if !claim_run(db, tenant_id, "birthday", today).await? {
            continue;
        }

        let mut failed = 0;
        for member in &members {
            if let Err(err) = queue.enqueue_task(&birthday_task(member), 0).await {
                warn!(
                    error = ?err,
                    user_id = %member.user_id,
                    "failed to enqueue birthday notice"
                );
                failed += 1;
            } else {
                enqueued += 1;
            }
        }

        // Retrying the whole tenant can duplicate a notice that did get
        // through; losing one silently is the worse outcome.
        if failed > 0 {
            warn!(
                tenant_id = %tenant_id,
                failed = failed,
                "releasing birthday marker for retry"
            );
            release_run(db, tenant_id, "birthday", today).await;
        }
    }

    if enqueued > 0 {
        info!(members = total, enqueued = enqueued, "enqueued birthday notices");
    }
    Ok(())
}

/// One row per (tenant, kind, day); losing the insert race means another
/// worker already generated this reminder.
async fn claim_run(db: &Db, tenant_id: Uuid, kind: &str, run_on: Date) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO reminder_runs (tenant_id, kind, run_on) VALUES ($1, $2, $3) \
         ON CONFLICT (tenant_id, kind, run_on) DO NOTHING",
    )
    .bind(tenant_id)
    .bind(kind)
    .bind(run_on)
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Best-effort undo of a claim whose enqueue never happened. If the delete
/// is lost too, the retry slips to the next day instead of this tick.
async fn release_run(db: &Db, tenant_id: Uuid, kind: &str, run_on: Date) {
    let result = sqlx::query(
        "DELETE FROM reminder_runs WHERE tenant_id = $1 AND kind = $2 AND run_on = $3",
    )
    .bind(tenant_id)
    .bind(kind)
    .bind(run_on)
    .execute(db.pool())
    .await;
    if let Err(err) = result {
        warn!(error = ?err, tenant_id = %tenant_id, kind = kind, "failed to release reminder marker");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, time};

    #[test]
    fn service_reminder_targets_the_whole_tenant_at_service_time() {
        let schedule = ServiceSchedule {
            tenant_id: Uuid::new_v4(),
            service_name: "Evening Prayer".into(),
            service_time: time!(18:30),
        };

        let task = service_reminder_task(&schedule, date!(2026 - 08 - 30));

        assert_eq!(task.attempt, 0);
        let SendJob::Tenant { tenant_id, message } = task.job else {
            panic!("expected a tenant-wide job");
        };
        assert_eq!(tenant_id, schedule.tenant_id);
        let NotificationPayload::ServiceReminder { starts_at, .. } = message.payload else {
            panic!("expected a service reminder payload");
        };
        assert_eq!(starts_at.date(), date!(2026 - 08 - 30));
        assert_eq!(starts_at.time(), time!(18:30));
    }

    #[test]
    fn birthday_notices_group_members_by_tenant() {
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        let members = vec![
            BirthdayMember {
                user_id: Uuid::new_v4(),
                tenant_id: tenant_a,
                display_name: "Ana".into(),
            },
            BirthdayMember {
                user_id: Uuid::new_v4(),
                tenant_id: tenant_b,
                display_name: "Ben".into(),
            },
            BirthdayMember {
                user_id: Uuid::new_v4(),
                tenant_id: tenant_a,
                display_name: "Cal".into(),
            },
        ];

        let grouped = group_by_tenant(members);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&tenant_a].len(), 2);
        assert_eq!(grouped[&tenant_b].len(), 1);
    }

    #[test]
    fn birthday_task_addresses_the_member() {
        let member = BirthdayMember {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            display_name: "Dora".into(),
        };

        let task = birthday_task(&member);

        let SendJob::User { user_id, message } = task.job else {
            panic!("expected a single-user job");
        };
        assert_eq!(user_id, member.user_id);
        assert!(message.body.contains("Dora"));
    }
}
