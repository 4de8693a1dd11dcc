use anyhow::{anyhow, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::Client;
use tracing::warn;

use crate::config::AppConfig;
use crate::jobs::sender::SendTask;

/// SQS drain bound: at most this many tasks are pulled per scheduler pass.
pub const MAX_TASKS_PER_DRAIN: i32 = 10;

#[derive(Clone)]
pub struct QueueClient {
    client: Client,
    queue_url: String,
}

#[derive(Debug)]
pub struct ReceivedTask {
    pub task: SendTask,
    pub receipt_handle: String,
}

impl QueueClient {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider =
            RegionProviderChain::first_try(Region::new(config.queue_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut sqs_builder = aws_sdk_sqs::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.queue_endpoint.clone());
        if let Some(provider) = shared_config.credentials_provider() {
            sqs_builder = sqs_builder.credentials_provider(provider);
        }

        let client = Client::from_conf(sqs_builder.build());
        let queue_url = match client
            .get_queue_url()
            .queue_name(&config.queue_name)
            .send()
            .await
        {
            Ok(response) => response
                .queue_url()
                .ok_or_else(|| anyhow!("missing queue url"))?
                .to_string(),
            Err(SdkError::ServiceError(service_err))
                if service_err.err().is_queue_does_not_exist() =>
            {
                let created = client
                    .create_queue()
                    .queue_name(&config.queue_name)
                    .send()
                    .await?;
                created
                    .queue_url()
                    .ok_or_else(|| anyhow!("missing queue url"))?
                    .to_string()
            }
            Err(err) => return Err(anyhow!(err)),
        };

        Ok(Self { client, queue_url })
    }

    /// Enqueue a send task, optionally delayed (SQS caps delays at 15 min).
    pub async fn enqueue_task(&self, task: &SendTask, delay_seconds: u64) -> Result<()> {
        let body = serde_json::to_string(task)?;
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .delay_seconds(delay_seconds.min(900) as i32)
            .send()
            .await?;
        Ok(())
    }

    /// Pull up to `max_tasks` tasks off the queue. Malformed messages are
    /// deleted and skipped so they cannot wedge the drain loop.
    pub async fn receive_tasks(
        &self,
        max_tasks: i32,
        wait_time_seconds: i32,
    ) -> Result<Vec<ReceivedTask>> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_tasks.clamp(1, MAX_TASKS_PER_DRAIN))
            .wait_time_seconds(wait_time_seconds)
            .send()
            .await?;

        let mut tasks = Vec::new();
        for message in response.messages() {
            let receipt_handle = match message.receipt_handle() {
                Some(handle) => handle.to_string(),
                None => {
                    warn!("queue message missing receipt handle");
                    continue;
                }
            };

            let body = match message.body() {
                Some(body) => body,
                None => {
                    warn!("queue message missing body, deleting");
                    let _ = self.delete_message(&receipt_handle).await;
                    continue;
                }
            };

            match serde_json::from_str::<SendTask>(body) {
                Ok(task) => tasks.push(ReceivedTask {
                    task,
                    receipt_handle,
                }),
                Err(err) => {
                    warn!(error = ?err, "failed to parse queue message body, deleting");
                    let _ = self.delete_message(&receipt_handle).await;
                }
            }
        }

        Ok(tasks)
    }

    pub async fn delete_message(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await?;
        Ok(())
    }
}
