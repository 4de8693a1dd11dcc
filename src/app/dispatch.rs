use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::devices::DeviceRegistry;
use crate::app::directory::UserDirectory;
use crate::app::rate_limiter::RateLimiter;
use crate::app::recorder::{
    AttemptOutcome, DeliveryRecorder, NewNotification, RecipientAttempt,
};
use crate::domain::device::Device;
use crate::domain::notification::{NotificationMessage, TargetMode};
use crate::infra::push::{PushError, PushMessage, PushProvider, MAX_BATCH_SIZE};
use crate::infra::queue::QueueClient;
use crate::jobs::sender::{SendJob, SendTask};

pub const REASON_NO_DEVICE: &str = "no active devices";
pub const REASON_RATE_LIMITED: &str = "rate limited";

/// The one dispatch failure reported synchronously to the caller. Every
/// other failure mode is absorbed into recipient bookkeeping and the call
/// still returns a summary.
#[derive(Debug)]
pub enum DispatchError {
    UserNotFound(Uuid),
    Infra(anyhow::Error),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::UserNotFound(id) => write!(f, "user not found: {}", id),
            DispatchError::Infra(err) => write!(f, "dispatch infrastructure failure: {}", err),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        DispatchError::Infra(err)
    }
}

/// What a fan-out call hands back: attempt-level tallies plus the id of the
/// Notification row that anchors the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub notification_id: Uuid,
    pub total_recipients: i32,
    pub sent: i32,
    pub failed: i32,
    pub no_device: i32,
    pub rate_limited: i32,
}

/// One provider message still carrying its (user, device) origin so
/// per-message results can be mapped back.
#[derive(Debug, Clone)]
pub struct FanoutMessage {
    pub user_id: Uuid,
    pub device_id: Uuid,
    pub message: PushMessage,
}

#[derive(Debug)]
pub struct DeviceOutcome {
    pub user_id: Uuid,
    pub device_id: Uuid,
    pub result: Result<(), PushError>,
}

pub fn build_messages(
    user_id: Uuid,
    devices: &[Device],
    message: &NotificationMessage,
) -> Vec<FanoutMessage> {
    devices
        .iter()
        .map(|device| FanoutMessage {
            user_id,
            device_id: device.id,
            message: PushMessage {
                token: device.token.clone(),
                platform: device.platform,
                title: message.title.clone(),
                body: message.body.clone(),
                data: serde_json::to_value(&message.payload)
                    .unwrap_or(serde_json::Value::Null),
                image_url: message.image_url.clone(),
            },
        })
        .collect()
}

fn push_error_text(err: &PushError) -> String {
    match err {
        PushError::Timeout => "provider timeout".to_string(),
        other => other.to_string(),
    }
}

async fn send_one(
    provider: &dyn PushProvider,
    message: &PushMessage,
    call_timeout: Duration,
) -> Result<(), PushError> {
    match tokio::time::timeout(call_timeout, provider.send(message)).await {
        Ok(result) => result,
        Err(_) => Err(PushError::Timeout),
    }
}

/// Deliver every message with its own provider call, at most `concurrency`
/// in flight. All of a user's devices are attempted regardless of earlier
/// failures; outcomes complete in any order.
pub async fn deliver_individually(
    provider: &dyn PushProvider,
    messages: Vec<FanoutMessage>,
    concurrency: usize,
    call_timeout: Duration,
) -> Vec<DeviceOutcome> {
    stream::iter(messages)
        .map(|fanout| async move {
            let result = send_one(provider, &fanout.message, call_timeout).await;
            DeviceOutcome {
                user_id: fanout.user_id,
                device_id: fanout.device_id,
                result,
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// Deliver messages through the provider's batch endpoint in chunks of at
/// most [`MAX_BATCH_SIZE`]. A chunk-level failure marks every message in
/// that chunk failed and the remaining chunks are still attempted.
pub async fn deliver_batched(
    provider: &dyn PushProvider,
    messages: Vec<FanoutMessage>,
    call_timeout: Duration,
) -> Vec<DeviceOutcome> {
    let mut outcomes = Vec::with_capacity(messages.len());

    for chunk in messages.chunks(MAX_BATCH_SIZE) {
        let batch: Vec<PushMessage> = chunk.iter().map(|m| m.message.clone()).collect();
        let call = tokio::time::timeout(call_timeout, provider.send_batch(&batch)).await;
        let chunk_result = match call {
            Ok(result) => result,
            Err(_) => Err(PushError::Timeout),
        };

        match chunk_result {
            Ok(results) => {
                for (fanout, result) in chunk.iter().zip(results) {
                    outcomes.push(DeviceOutcome {
                        user_id: fanout.user_id,
                        device_id: fanout.device_id,
                        result,
                    });
                }
            }
            Err(err) => {
                warn!(error = %err, chunk_len = chunk.len(), "provider batch call failed");
                for fanout in chunk {
                    outcomes.push(DeviceOutcome {
                        user_id: fanout.user_id,
                        device_id: fanout.device_id,
                        result: Err(err.clone()),
                    });
                }
            }
        }
    }

    outcomes
}

fn dedupe_preserving_order(user_ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    user_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

fn has_active_devices(device_map: &HashMap<Uuid, Vec<Device>>, user_id: Uuid) -> bool {
    device_map.get(&user_id).map_or(false, |devices| !devices.is_empty())
}

struct FanoutPlan {
    immediate: Vec<RecipientAttempt>,
    messages: Vec<FanoutMessage>,
    no_device: i32,
    rate_limited: i32,
}

/// Partition a deduplicated target list before any provider call: users
/// without an active device and rate-limited users each become one
/// immediate failed attempt; everyone else contributes one message per
/// device.
fn plan_fanout(
    user_ids: &[Uuid],
    device_map: &HashMap<Uuid, Vec<Device>>,
    limited: &HashSet<Uuid>,
    message: &NotificationMessage,
) -> FanoutPlan {
    let mut immediate = Vec::new();
    let mut messages = Vec::new();
    let mut no_device = 0;
    let mut rate_limited = 0;

    for user_id in user_ids {
        if !has_active_devices(device_map, *user_id) {
            no_device += 1;
            immediate.push(RecipientAttempt {
                user_id: *user_id,
                device_id: None,
                outcome: AttemptOutcome::Failed {
                    error: REASON_NO_DEVICE.into(),
                },
            });
        } else if limited.contains(user_id) {
            rate_limited += 1;
            immediate.push(RecipientAttempt {
                user_id: *user_id,
                device_id: None,
                outcome: AttemptOutcome::Failed {
                    error: REASON_RATE_LIMITED.into(),
                },
            });
        } else {
            messages.extend(build_messages(*user_id, &device_map[user_id], message));
        }
    }

    FanoutPlan {
        immediate,
        messages,
        no_device,
        rate_limited,
    }
}

/// Fan-out orchestrator. Always creates the Notification row before any
/// delivery attempt; absorbs every per-recipient failure into bookkeeping.
#[derive(Clone)]
pub struct DispatchEngine {
    registry: DeviceRegistry,
    limiter: RateLimiter,
    recorder: DeliveryRecorder,
    directory: UserDirectory,
    provider: Arc<dyn PushProvider>,
    queue: QueueClient,
    concurrency: usize,
    call_timeout: Duration,
}

impl DispatchEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: DeviceRegistry,
        limiter: RateLimiter,
        recorder: DeliveryRecorder,
        directory: UserDirectory,
        provider: Arc<dyn PushProvider>,
        queue: QueueClient,
        concurrency: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            limiter,
            recorder,
            directory,
            provider,
            queue,
            concurrency,
            call_timeout,
        }
    }

    pub async fn send_to_user(
        &self,
        user_id: Uuid,
        message: NotificationMessage,
    ) -> Result<DispatchSummary, DispatchError> {
        let user = self
            .directory
            .get_user(user_id)
            .await?
            .ok_or(DispatchError::UserNotFound(user_id))?;

        let notification = self
            .recorder
            .create_notification(NewNotification {
                tenant_id: user.tenant_id,
                message: message.clone(),
                target_mode: TargetMode::Individual,
                target_user_ids: vec![user_id],
                total_recipients: 1,
                scheduled_at: None,
            })
            .await?;

        if !self.limiter.allow(user_id).await {
            self.recorder
                .record_attempt(
                    notification.id,
                    RecipientAttempt {
                        user_id,
                        device_id: None,
                        outcome: AttemptOutcome::Failed {
                            error: REASON_RATE_LIMITED.into(),
                        },
                    },
                )
                .await?;
            return Ok(DispatchSummary {
                notification_id: notification.id,
                total_recipients: 1,
                sent: 0,
                failed: 1,
                no_device: 0,
                rate_limited: 1,
            });
        }

        let devices = self.registry.active_devices_for(user_id).await?;
        if devices.is_empty() {
            self.recorder
                .record_attempt(
                    notification.id,
                    RecipientAttempt {
                        user_id,
                        device_id: None,
                        outcome: AttemptOutcome::Failed {
                            error: REASON_NO_DEVICE.into(),
                        },
                    },
                )
                .await?;
            return Ok(DispatchSummary {
                notification_id: notification.id,
                total_recipients: 1,
                sent: 0,
                failed: 1,
                no_device: 1,
                rate_limited: 0,
            });
        }

        let messages = build_messages(user_id, &devices, &message);
        let outcomes = deliver_individually(
            self.provider.as_ref(),
            messages,
            self.concurrency,
            self.call_timeout,
        )
        .await;

        let summary = self
            .record_device_outcomes(notification.id, 1, outcomes, 0, 0)
            .await?;
        self.recorder.mark_sent_at(notification.id).await?;

        info!(
            notification_id = %notification.id,
            user_id = %user_id,
            sent = summary.sent,
            failed = summary.failed,
            "dispatched notification to user"
        );
        Ok(summary)
    }

    pub async fn send_to_multiple_users(
        &self,
        tenant_id: Uuid,
        user_ids: &[Uuid],
        message: NotificationMessage,
    ) -> Result<DispatchSummary, DispatchError> {
        self.send_to_many(tenant_id, user_ids, message, TargetMode::Group)
            .await
    }

    pub async fn send_to_tenant(
        &self,
        tenant_id: Uuid,
        message: NotificationMessage,
    ) -> Result<DispatchSummary, DispatchError> {
        let user_ids = self.directory.list_active_users_of_tenant(tenant_id).await?;

        if user_ids.is_empty() {
            // Still leave a history entry for the attempted broadcast.
            let notification = self
                .recorder
                .create_notification(NewNotification {
                    tenant_id,
                    message,
                    target_mode: TargetMode::TenantWide,
                    target_user_ids: Vec::new(),
                    total_recipients: 0,
                    scheduled_at: None,
                })
                .await?;
            info!(tenant_id = %tenant_id, "tenant broadcast found no recipients");
            return Ok(DispatchSummary {
                notification_id: notification.id,
                total_recipients: 0,
                sent: 0,
                failed: 0,
                no_device: 0,
                rate_limited: 0,
            });
        }

        self.send_to_many(tenant_id, &user_ids, message, TargetMode::TenantWide)
            .await
    }

    async fn send_to_many(
        &self,
        tenant_id: Uuid,
        user_ids: &[Uuid],
        message: NotificationMessage,
        target_mode: TargetMode,
    ) -> Result<DispatchSummary, DispatchError> {
        let user_ids = dedupe_preserving_order(user_ids);
        let total = user_ids.len() as i32;

        let notification = self
            .recorder
            .create_notification(NewNotification {
                tenant_id,
                message: message.clone(),
                target_mode,
                target_user_ids: user_ids.clone(),
                total_recipients: total,
                scheduled_at: None,
            })
            .await?;

        let device_map: HashMap<Uuid, Vec<Device>> =
            self.registry.active_devices_for_many(&user_ids).await?;

        // The limiter is only consulted for users who could actually
        // receive something; an allow() call spends window quota.
        let mut limited = HashSet::new();
        for user_id in &user_ids {
            if has_active_devices(&device_map, *user_id) && !self.limiter.allow(*user_id).await {
                limited.insert(*user_id);
            }
        }

        let plan = plan_fanout(&user_ids, &device_map, &limited, &message);

        // Immediate failures are on the books before any provider call.
        self.recorder
            .record_attempts(notification.id, &plan.immediate)
            .await?;

        let outcomes =
            deliver_batched(self.provider.as_ref(), plan.messages, self.call_timeout).await;

        let summary = self
            .record_device_outcomes(
                notification.id,
                total,
                outcomes,
                plan.no_device,
                plan.rate_limited,
            )
            .await?;
        self.recorder.mark_sent_at(notification.id).await?;

        info!(
            notification_id = %notification.id,
            tenant_id = %tenant_id,
            mode = target_mode.as_str(),
            total = total,
            sent = summary.sent,
            failed = summary.failed,
            "dispatched notification fan-out"
        );
        Ok(summary)
    }

    /// Persist per-device outcomes, hand failed device attempts to the
    /// background retry queue, and fold in the immediate failures.
    async fn record_device_outcomes(
        &self,
        notification_id: Uuid,
        total_recipients: i32,
        outcomes: Vec<DeviceOutcome>,
        no_device: i32,
        rate_limited: i32,
    ) -> Result<DispatchSummary, DispatchError> {
        let attempts: Vec<RecipientAttempt> = outcomes
            .iter()
            .map(|outcome| RecipientAttempt {
                user_id: outcome.user_id,
                device_id: Some(outcome.device_id),
                outcome: match &outcome.result {
                    Ok(()) => AttemptOutcome::Sent,
                    Err(err) => AttemptOutcome::Failed {
                        error: push_error_text(err),
                    },
                },
            })
            .collect();

        let recipient_ids = self
            .recorder
            .record_attempts(notification_id, &attempts)
            .await?;

        let mut sent = 0;
        let mut failed = no_device + rate_limited;
        for (outcome, recipient_id) in outcomes.iter().zip(recipient_ids) {
            match &outcome.result {
                Ok(()) => sent += 1,
                Err(_) => {
                    failed += 1;
                    self.enqueue_recipient_retry(recipient_id).await;
                }
            }
        }

        Ok(DispatchSummary {
            notification_id,
            total_recipients,
            sent,
            failed,
            no_device,
            rate_limited,
        })
    }

    /// Retry scheduling is best-effort: a queue outage must not fail a
    /// fan-out that already has its outcomes recorded.
    async fn enqueue_recipient_retry(&self, recipient_id: Uuid) {
        let task = SendTask {
            attempt: 0,
            job: SendJob::RetryRecipient { recipient_id },
        };
        if let Err(err) = self
            .queue
            .enqueue_task(&task, crate::jobs::sender::backoff_delay_seconds(0))
            .await
        {
            warn!(
                error = ?err,
                recipient_id = %recipient_id,
                "failed to enqueue recipient retry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::Platform;
    use crate::domain::notification::NotificationPayload;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn message() -> NotificationMessage {
        NotificationMessage {
            title: "Test".into(),
            body: "Body".into(),
            payload: NotificationPayload::Announcement { topic: None },
            image_url: None,
            sender_id: None,
        }
    }

    fn device(user_id: Uuid, token: &str) -> Device {
        Device {
            id: Uuid::new_v4(),
            user_id,
            token: token.into(),
            platform: Platform::Android,
            model: None,
            app_version: None,
            active: true,
            last_used_at: time::OffsetDateTime::now_utc(),
            created_at: time::OffsetDateTime::now_utc(),
        }
    }

    fn fanout(user_id: Uuid, tokens: &[&str]) -> Vec<FanoutMessage> {
        let devices: Vec<Device> = tokens.iter().map(|t| device(user_id, t)).collect();
        build_messages(user_id, &devices, &message())
    }

    /// Scriptable provider: tokens listed in `failing` are rejected, chunks
    /// whose index is in `failing_chunks` fail wholesale.
    struct ScriptedProvider {
        failing: Vec<String>,
        failing_chunks: Vec<usize>,
        batch_calls: Mutex<Vec<usize>>,
    }

    impl ScriptedProvider {
        fn new(failing: &[&str], failing_chunks: &[usize]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                failing_chunks: failing_chunks.to_vec(),
                batch_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PushProvider for ScriptedProvider {
        async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
            if self.failing.contains(&message.token) {
                Err(PushError::Provider("invalid token".into()))
            } else {
                Ok(())
            }
        }

        async fn send_batch(
            &self,
            messages: &[PushMessage],
        ) -> Result<Vec<Result<(), PushError>>, PushError> {
            let call_index = {
                let mut calls = self.batch_calls.lock().unwrap();
                calls.push(messages.len());
                calls.len() - 1
            };
            if self.failing_chunks.contains(&call_index) {
                return Err(PushError::Transport("connection reset".into()));
            }
            Ok(messages
                .iter()
                .map(|m| {
                    if self.failing.contains(&m.token) {
                        Err(PushError::Provider("invalid token".into()))
                    } else {
                        Ok(())
                    }
                })
                .collect())
        }
    }

    struct StalledProvider;

    #[async_trait]
    impl PushProvider for StalledProvider {
        async fn send(&self, _message: &PushMessage) -> Result<(), PushError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn send_batch(
            &self,
            _messages: &[PushMessage],
        ) -> Result<Vec<Result<(), PushError>>, PushError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn all_devices_attempted_even_when_one_fails() {
        let user = Uuid::new_v4();
        let provider = ScriptedProvider::new(&["bad"], &[]);
        let outcomes =
            deliver_individually(&provider, fanout(user, &["good", "bad"]), 10, TIMEOUT).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| o.result.is_err()).count(), 1);
    }

    #[tokio::test]
    async fn batches_are_chunked_at_the_provider_cap() {
        let user = Uuid::new_v4();
        let tokens: Vec<String> = (0..MAX_BATCH_SIZE + 3).map(|i| format!("t{}", i)).collect();
        let token_refs: Vec<&str> = tokens.iter().map(|s| s.as_str()).collect();
        let provider = ScriptedProvider::new(&[], &[]);

        let outcomes = deliver_batched(&provider, fanout(user, &token_refs), TIMEOUT).await;

        assert_eq!(outcomes.len(), MAX_BATCH_SIZE + 3);
        let calls = provider.batch_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![MAX_BATCH_SIZE, 3]);
    }

    #[tokio::test]
    async fn failing_chunk_does_not_abort_remaining_chunks() {
        let user = Uuid::new_v4();
        let tokens: Vec<String> = (0..MAX_BATCH_SIZE + 10).map(|i| format!("t{}", i)).collect();
        let token_refs: Vec<&str> = tokens.iter().map(|s| s.as_str()).collect();
        let provider = ScriptedProvider::new(&[], &[0]);

        let outcomes = deliver_batched(&provider, fanout(user, &token_refs), TIMEOUT).await;

        assert_eq!(outcomes.len(), MAX_BATCH_SIZE + 10);
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        let sent = outcomes.iter().filter(|o| o.result.is_ok()).count();
        assert_eq!(failed, MAX_BATCH_SIZE);
        assert_eq!(sent, 10);
        // Both chunks were attempted.
        assert_eq!(provider.batch_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn per_message_results_map_back_positionally() {
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let mut messages = fanout(user_a, &["a1", "bad"]);
        messages.extend(fanout(user_b, &["b1"]));
        let provider = ScriptedProvider::new(&["bad"], &[]);

        let outcomes = deliver_batched(&provider, messages, TIMEOUT).await;

        let failed: Vec<_> = outcomes.iter().filter(|o| o.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].user_id, user_a);
        assert!(outcomes
            .iter()
            .filter(|o| o.user_id == user_b)
            .all(|o| o.result.is_ok()));
    }

    #[tokio::test]
    async fn stalled_provider_call_becomes_a_timeout_failure() {
        let user = Uuid::new_v4();
        let outcomes =
            deliver_individually(&StalledProvider, fanout(user, &["t1"]), 10, TIMEOUT).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result, Err(PushError::Timeout));

        let outcomes = deliver_batched(&StalledProvider, fanout(user, &["t1"]), TIMEOUT).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result, Err(PushError::Timeout));
    }

    #[tokio::test]
    async fn users_without_devices_fail_before_any_provider_call() {
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let mut device_map = HashMap::new();
        for id in &ids[..3] {
            device_map.insert(*id, vec![device(*id, &format!("t-{}", id))]);
        }

        let plan = plan_fanout(&ids, &device_map, &HashSet::new(), &message());

        // The two device-less users become immediate failures.
        assert_eq!(plan.no_device, 2);
        assert_eq!(plan.immediate.len(), 2);
        assert!(plan.immediate.iter().all(|attempt| {
            attempt.device_id.is_none()
                && matches!(
                    &attempt.outcome,
                    AttemptOutcome::Failed { error } if error == REASON_NO_DEVICE
                )
        }));

        // The provider only ever sees the three users with devices.
        assert_eq!(plan.messages.len(), 3);
        let provider = ScriptedProvider::new(&[], &[]);
        let outcomes = deliver_batched(&provider, plan.messages, TIMEOUT).await;
        let reached: HashSet<Uuid> = outcomes.iter().map(|o| o.user_id).collect();
        assert!(ids[..3].iter().all(|id| reached.contains(id)));
        assert!(ids[3..].iter().all(|id| !reached.contains(id)));
    }

    #[test]
    fn rate_limited_users_contribute_no_provider_messages() {
        let allowed = Uuid::new_v4();
        let blocked = Uuid::new_v4();
        let mut device_map = HashMap::new();
        device_map.insert(allowed, vec![device(allowed, "a1")]);
        device_map.insert(blocked, vec![device(blocked, "b1")]);
        let limited = HashSet::from([blocked]);

        let plan = plan_fanout(&[allowed, blocked], &device_map, &limited, &message());

        assert_eq!(plan.rate_limited, 1);
        assert_eq!(plan.immediate.len(), 1);
        assert_eq!(plan.immediate[0].user_id, blocked);
        assert!(matches!(
            &plan.immediate[0].outcome,
            AttemptOutcome::Failed { error } if error == REASON_RATE_LIMITED
        ));
        assert_eq!(plan.messages.len(), 1);
        assert_eq!(plan.messages[0].user_id, allowed);
    }

    #[test]
    fn duplicate_targets_collapse_to_one() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedupe_preserving_order(&[a, b, a, a, b]), vec![a, b]);
    }

    #[test]
    fn timeout_failures_carry_a_distinguishable_reason() {
        assert_eq!(push_error_text(&PushError::Timeout), "provider timeout");
        assert!(push_error_text(&PushError::Provider("boom".into())).contains("boom"));
    }
}
