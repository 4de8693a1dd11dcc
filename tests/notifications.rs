use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use steeple::app::dispatch::{build_messages, deliver_batched, deliver_individually};
use steeple::domain::device::{Device, Platform};
use steeple::domain::notification::{NotificationMessage, NotificationPayload};
use steeple::infra::push::{PushError, PushMessage, PushProvider, MAX_BATCH_SIZE};

const TIMEOUT: Duration = Duration::from_millis(500);

fn announcement() -> NotificationMessage {
    NotificationMessage {
        title: "Potluck this Friday".into(),
        body: "Bring a dish to share after the evening service.".into(),
        payload: NotificationPayload::Announcement {
            topic: Some("events".into()),
        },
        image_url: None,
        sender_id: None,
    }
}

fn devices_for(user_id: Uuid, count: usize) -> Vec<Device> {
    (0..count)
        .map(|i| Device {
            id: Uuid::new_v4(),
            user_id,
            token: format!("{}-{}", user_id, i),
            platform: if i % 2 == 0 {
                Platform::Ios
            } else {
                Platform::Android
            },
            model: None,
            app_version: None,
            active: true,
            last_used_at: time::OffsetDateTime::now_utc(),
            created_at: time::OffsetDateTime::now_utc(),
        })
        .collect()
}

/// Fails every odd-indexed message it sees; counts provider calls.
struct FlakyProvider {
    calls: AtomicUsize,
}

impl FlakyProvider {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PushProvider for FlakyProvider {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if message.token.ends_with("-1") {
            Err(PushError::Provider("unregistered token".into()))
        } else {
            Ok(())
        }
    }

    async fn send_batch(
        &self,
        messages: &[PushMessage],
    ) -> Result<Vec<Result<(), PushError>>, PushError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(messages
            .iter()
            .enumerate()
            .map(|(i, _)| {
                if i % 2 == 1 {
                    Err(PushError::Provider("unregistered token".into()))
                } else {
                    Ok(())
                }
            })
            .collect())
    }
}

#[test]
fn push_messages_carry_the_structured_payload() {
    let user_id = Uuid::new_v4();
    let messages = build_messages(user_id, &devices_for(user_id, 2), &announcement());

    assert_eq!(messages.len(), 2);
    for fanout in &messages {
        assert_eq!(fanout.user_id, user_id);
        assert_eq!(fanout.message.data["kind"], "announcement");
        assert_eq!(fanout.message.data["topic"], "events");
    }
    // One message per device, each addressed to its own token.
    assert_ne!(messages[0].message.token, messages[1].message.token);
}

#[tokio::test]
async fn one_user_two_devices_mixed_outcome() {
    let user_id = Uuid::new_v4();
    let provider = FlakyProvider::new();
    let messages = build_messages(user_id, &devices_for(user_id, 2), &announcement());

    let outcomes = deliver_individually(&provider, messages, 10, TIMEOUT).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 1);
    assert_eq!(outcomes.iter().filter(|o| o.result.is_err()).count(), 1);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn large_fanout_uses_batched_provider_calls() {
    let mut messages = Vec::new();
    for _ in 0..((MAX_BATCH_SIZE / 2) + 10) {
        let user_id = Uuid::new_v4();
        messages.extend(build_messages(user_id, &devices_for(user_id, 2), &announcement()));
    }
    let total = messages.len();
    assert!(total > MAX_BATCH_SIZE);

    let provider = FlakyProvider::new();
    let outcomes = deliver_batched(&provider, messages, TIMEOUT).await;

    assert_eq!(outcomes.len(), total);
    // ceil(total / MAX_BATCH_SIZE) chunks.
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    // Every outcome still maps to a real (user, device) pair.
    assert!(outcomes.iter().all(|o| !o.device_id.is_nil()));
}

#[tokio::test]
async fn provider_errors_keep_their_text_for_the_recipient_row() {
    let user_id = Uuid::new_v4();
    let provider = FlakyProvider::new();
    let messages = build_messages(user_id, &devices_for(user_id, 2), &announcement());

    let outcomes = deliver_batched(&provider, messages, TIMEOUT).await;
    let failure = outcomes
        .iter()
        .find_map(|o| o.result.as_ref().err())
        .expect("one message should fail");
    assert!(failure.to_string().contains("unregistered token"));
}
