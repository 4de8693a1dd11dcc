use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::domain::device::Platform;

/// Hard cap on messages per provider batch call.
pub const MAX_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub token: String,
    pub platform: Platform,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// The provider rejected the message; carries its error text.
    Provider(String),
    /// The per-call deadline elapsed before the provider answered.
    Timeout,
    /// The call never reached the provider.
    Transport(String),
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushError::Provider(message) => write!(f, "provider error: {}", message),
            PushError::Timeout => write!(f, "provider timeout"),
            PushError::Transport(message) => write!(f, "transport error: {}", message),
        }
    }
}

impl std::error::Error for PushError {}

/// The outbound delivery capability: one message to one device token, plus a
/// batched variant. Implementations must not exceed [`MAX_BATCH_SIZE`]
/// results per batch call; callers never pass more messages than that.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError>;

    /// One result per input message, positionally. A top-level `Err` means
    /// the whole call failed and no message in the batch was delivered.
    async fn send_batch(
        &self,
        messages: &[PushMessage],
    ) -> Result<Vec<Result<(), PushError>>, PushError>;
}

#[derive(Deserialize)]
struct BatchItem {
    ok: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct BatchResponse {
    results: Vec<BatchItem>,
}

#[derive(Deserialize)]
struct GatewayError {
    error: String,
}

/// HTTP push-gateway adapter. The gateway fronts the platform services
/// (APNs/FCM/web push); this client only speaks its JSON API.
#[derive(Clone)]
pub struct HttpPushClient {
    http: reqwest::Client,
    base_url: Url,
    api_token: String,
}

impl HttpPushClient {
    pub fn new(base_url: &str, api_token: String, timeout: Duration) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        // Url::join treats the last segment of a slash-less path as a file
        // and replaces it; anchor the base as a directory instead.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            api_token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PushError> {
        self.base_url
            .join(path)
            .map_err(|err| PushError::Transport(err.to_string()))
    }

    async fn post(&self, url: Url, body: &impl Serialize) -> Result<reqwest::Response, PushError> {
        self.http
            .post(url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    PushError::Timeout
                } else {
                    PushError::Transport(err.to_string())
                }
            })
    }
}

async fn error_text(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<GatewayError>().await {
        Ok(body) => body.error,
        Err(_) => format!("gateway returned {}", status),
    }
}

#[async_trait]
impl PushProvider for HttpPushClient {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        let url = self.endpoint("v1/send")?;
        let response = self.post(url, message).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(PushError::Provider(error_text(response).await))
        }
    }

    async fn send_batch(
        &self,
        messages: &[PushMessage],
    ) -> Result<Vec<Result<(), PushError>>, PushError> {
        let url = self.endpoint("v1/send/batch")?;
        let response = self
            .post(url, &serde_json::json!({ "messages": messages }))
            .await?;
        if !response.status().is_success() {
            return Err(PushError::Provider(error_text(response).await));
        }

        let body: BatchResponse = response
            .json()
            .await
            .map_err(|err| PushError::Transport(err.to_string()))?;
        if body.results.len() != messages.len() {
            return Err(PushError::Provider(format!(
                "gateway returned {} results for {} messages",
                body.results.len(),
                messages.len()
            )));
        }

        Ok(body
            .results
            .into_iter()
            .map(|item| {
                if item.ok {
                    Ok(())
                } else {
                    Err(PushError::Provider(
                        item.error.unwrap_or_else(|| "unknown provider error".into()),
                    ))
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> HttpPushClient {
        HttpPushClient::new(base_url, "token".into(), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn endpoint_keeps_a_path_prefix_without_trailing_slash() {
        let url = client("https://gw.example/api").endpoint("v1/send").unwrap();
        assert_eq!(url.as_str(), "https://gw.example/api/v1/send");
    }

    #[test]
    fn endpoint_joins_cleanly_with_trailing_slash() {
        let url = client("https://gw.example/api/").endpoint("v1/send/batch").unwrap();
        assert_eq!(url.as_str(), "https://gw.example/api/v1/send/batch");
    }

    #[test]
    fn endpoint_works_from_a_bare_host() {
        let url = client("https://gw.example").endpoint("v1/send").unwrap();
        assert_eq!(url.as_str(), "https://gw.example/v1/send");
    }
}
