use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::app::recorder::DeliveryRecorder;
use crate::domain::recipient::RecipientStatus;
use crate::infra::push::{PushError, PushMessage, PushProvider};

#[derive(Debug)]
pub enum RetryOutcome {
    /// Nothing left to do: either the send succeeded or the recipient is no
    /// longer eligible for retry.
    Completed,
    /// The provider failed again; the caller re-schedules with backoff.
    FailedAgain(String),
}

/// Re-drive one failed recipient through the provider. Idempotent: a
/// recipient that was already retried to `sent`, or whose device has gone
/// inactive, completes without a provider call.
pub async fn retry_recipient(
    recorder: &DeliveryRecorder,
    provider: &dyn PushProvider,
    recipient_id: Uuid,
    call_timeout: Duration,
) -> Result<RetryOutcome> {
    let Some((recipient, device)) = recorder.get_recipient_with_device(recipient_id).await? else {
        debug!(recipient_id = %recipient_id, "retry target no longer exists");
        return Ok(RetryOutcome::Completed);
    };

    if recipient.status != RecipientStatus::Failed {
        debug!(
            recipient_id = %recipient_id,
            status = recipient.status.as_str(),
            "recipient no longer failed, skipping retry"
        );
        return Ok(RetryOutcome::Completed);
    }

    let Some(device) = device.filter(|device| device.active) else {
        debug!(recipient_id = %recipient_id, "recipient has no active device, skipping retry");
        return Ok(RetryOutcome::Completed);
    };

    let Some(notification) = recorder.get_notification(recipient.notification_id).await? else {
        return Ok(RetryOutcome::Completed);
    };

    let message = PushMessage {
        token: device.token.clone(),
        platform: device.platform,
        title: notification.title.clone(),
        body: notification.body.clone(),
        data: serde_json::to_value(&notification.payload).unwrap_or(serde_json::Value::Null),
        image_url: notification.image_url.clone(),
    };

    let result = match tokio::time::timeout(call_timeout, provider.send(&message)).await {
        Ok(result) => result,
        Err(_) => Err(PushError::Timeout),
    };

    match result {
        Ok(()) => {
            recorder.mark_retried_sent(recipient_id).await?;
            info!(
                recipient_id = %recipient_id,
                notification_id = %recipient.notification_id,
                "recipient retry succeeded"
            );
            Ok(RetryOutcome::Completed)
        }
        Err(err) => Ok(RetryOutcome::FailedAgain(err.to_string())),
    }
}
