use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::dispatch::{DispatchEngine, DispatchError};
use crate::app::recorder::DeliveryRecorder;
use crate::domain::notification::NotificationMessage;
use crate::infra::push::PushProvider;
use crate::infra::queue::{QueueClient, MAX_TASKS_PER_DRAIN};
use crate::jobs::retry::{self, RetryOutcome};

const POLL_WAIT_SECONDS: i32 = 10;
const IDLE_SLEEP_MS: u64 = 200;
const ERROR_BACKOFF_MS: u64 = 1000;

/// Whole-task retry ceiling for dispatch jobs.
pub const MAX_TASK_ATTEMPTS: u32 = 3;
/// Single failed recipients get a longer leash than whole fan-outs.
pub const RECIPIENT_RETRY_LIMIT: u32 = 5;

const BACKOFF_BASE_SECONDS: u64 = 60;
const BACKOFF_JITTER_SECONDS: u64 = 15;

/// A queued unit of send work, with the attempts already spent on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendTask {
    pub attempt: u32,
    pub job: SendJob,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SendJob {
    User {
        user_id: Uuid,
        message: NotificationMessage,
    },
    Users {
        tenant_id: Uuid,
        user_ids: Vec<Uuid>,
        message: NotificationMessage,
    },
    Tenant {
        tenant_id: Uuid,
        message: NotificationMessage,
    },
    RetryRecipient {
        recipient_id: Uuid,
    },
}

impl SendJob {
    pub fn max_attempts(&self) -> u32 {
        match self {
            SendJob::RetryRecipient { .. } => RECIPIENT_RETRY_LIMIT,
            _ => MAX_TASK_ATTEMPTS,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SendJob::User { .. } => "user",
            SendJob::Users { .. } => "users",
            SendJob::Tenant { .. } => "tenant",
            SendJob::RetryRecipient { .. } => "retry_recipient",
        }
    }
}

/// Exponential backoff before the next attempt: 60s doubled per prior
/// attempt, capped below the SQS delay ceiling.
pub fn backoff_base_seconds(attempt: u32) -> u64 {
    BACKOFF_BASE_SECONDS
        .saturating_mul(1u64 << attempt.min(10))
        .min(900)
}

pub fn backoff_delay_seconds(attempt: u32) -> u64 {
    let jitter = rand::thread_rng().gen_range(0..=BACKOFF_JITTER_SECONDS);
    (backoff_base_seconds(attempt) + jitter).min(900)
}

enum TaskOutcome {
    Completed,
    Retry(anyhow::Error),
}

/// Worker-mode queue drain. Pulls at most [`MAX_TASKS_PER_DRAIN`] tasks per
/// pass, runs each dispatch off the request path, and re-enqueues failures
/// with backoff until the task's attempt ceiling.
pub async fn run(
    engine: DispatchEngine,
    recorder: DeliveryRecorder,
    provider: std::sync::Arc<dyn PushProvider>,
    queue: QueueClient,
    call_timeout: Duration,
) -> Result<()> {
    info!("send-task worker started");
    loop {
        match queue.receive_tasks(MAX_TASKS_PER_DRAIN, POLL_WAIT_SECONDS).await {
            Ok(tasks) if !tasks.is_empty() => {
                for received in tasks {
                    let task = received.task;
                    let outcome =
                        process_task(&engine, &recorder, provider.as_ref(), &task, call_timeout)
                            .await;

                    if let Err(err) = queue.delete_message(&received.receipt_handle).await {
                        warn!(error = ?err, "failed to delete queue message");
                    }

                    if let TaskOutcome::Retry(err) = outcome {
                        let next_attempt = task.attempt + 1;
                        if next_attempt >= task.job.max_attempts() {
                            error!(
                                error = ?err,
                                kind = task.job.kind(),
                                attempts = next_attempt,
                                "send task exhausted retries, abandoning"
                            );
                            continue;
                        }
                        let delay = backoff_delay_seconds(task.attempt);
                        warn!(
                            error = ?err,
                            kind = task.job.kind(),
                            attempt = next_attempt,
                            delay_seconds = delay,
                            "send task failed, re-enqueueing"
                        );
                        let retry_task = SendTask {
                            attempt: next_attempt,
                            job: task.job.clone(),
                        };
                        if let Err(err) = queue.enqueue_task(&retry_task, delay).await {
                            error!(error = ?err, "failed to re-enqueue send task");
                        }
                    }
                }
            }
            Ok(_) => {
                tokio::time::sleep(Duration::from_millis(IDLE_SLEEP_MS)).await;
            }
            Err(err) => {
                warn!(error = ?err, "queue receive failed, backing off");
                tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
            }
        }
    }
}

async fn process_task(
    engine: &DispatchEngine,
    recorder: &DeliveryRecorder,
    provider: &dyn PushProvider,
    task: &SendTask,
    call_timeout: Duration,
) -> TaskOutcome {
    let result = match &task.job {
        SendJob::User { user_id, message } => {
            engine.send_to_user(*user_id, message.clone()).await
        }
        SendJob::Users {
            tenant_id,
            user_ids,
            message,
        } => {
            engine
                .send_to_multiple_users(*tenant_id, user_ids, message.clone())
                .await
        }
        SendJob::Tenant { tenant_id, message } => {
            engine.send_to_tenant(*tenant_id, message.clone()).await
        }
        SendJob::RetryRecipient { recipient_id } => {
            return match retry::retry_recipient(recorder, provider, *recipient_id, call_timeout)
                .await
            {
                Ok(RetryOutcome::Completed) => TaskOutcome::Completed,
                Ok(RetryOutcome::FailedAgain(reason)) => {
                    TaskOutcome::Retry(anyhow::anyhow!("recipient retry failed: {}", reason))
                }
                Err(err) => TaskOutcome::Retry(err),
            };
        }
    };

    match result {
        Ok(summary) => {
            info!(
                notification_id = %summary.notification_id,
                sent = summary.sent,
                failed = summary.failed,
                "send task completed"
            );
            TaskOutcome::Completed
        }
        // A missing user is a caller mistake; retrying cannot fix it.
        Err(DispatchError::UserNotFound(user_id)) => {
            warn!(user_id = %user_id, "send task targeted unknown user, dropping");
            TaskOutcome::Completed
        }
        Err(DispatchError::Infra(err)) => TaskOutcome::Retry(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_base_seconds(0), 60);
        assert_eq!(backoff_base_seconds(1), 120);
        assert_eq!(backoff_base_seconds(2), 240);
    }

    #[test]
    fn backoff_is_capped_below_the_queue_delay_ceiling() {
        assert_eq!(backoff_base_seconds(6), 900);
        assert_eq!(backoff_base_seconds(60), 900);
        for attempt in 0..16 {
            assert!(backoff_delay_seconds(attempt) <= 900);
        }
    }

    #[test]
    fn recipient_retries_have_their_own_ceiling() {
        let retry = SendJob::RetryRecipient {
            recipient_id: Uuid::new_v4(),
        };
        let fanout = SendJob::Tenant {
            tenant_id: Uuid::new_v4(),
            message: crate::domain::notification::NotificationMessage {
                title: "t".into(),
                body: "b".into(),
                payload: crate::domain::notification::NotificationPayload::Announcement {
                    topic: None,
                },
                image_url: None,
                sender_id: None,
            },
        };
        assert_eq!(retry.max_attempts(), RECIPIENT_RETRY_LIMIT);
        assert_eq!(fanout.max_attempts(), MAX_TASK_ATTEMPTS);
    }

    #[test]
    fn send_task_round_trips_through_json() {
        let task = SendTask {
            attempt: 2,
            job: SendJob::RetryRecipient {
                recipient_id: Uuid::new_v4(),
            },
        };
        let json = serde_json::to_string(&task).unwrap();
        let back: SendTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back.attempt, 2);
        assert!(matches!(back.job, SendJob::RetryRecipient { .. }));
    }
}
