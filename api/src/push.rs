use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("http error: {0}")]
    Http(String),
    #[error("push dispatch rejected: {0}")]
    Rejected(String),
}

/// A notification addressed by opaque device token.
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
}

/// The push-notification dispatch service. Returns a provider message id.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, message: PushMessage) -> Result<String, PushError>;
}

/// FCM-backed push dispatcher.
pub struct FcmPush {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
}

impl FcmPush {
    pub fn new(endpoint: String, server_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            server_key,
        }
    }
}

#[derive(Debug, Serialize)]
struct FcmRequest {
    to: String,
    notification: FcmNotification,
}

#[derive(Debug, Serialize)]
struct FcmNotification {
    title: String,
    body: String,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    message_id: Option<String>,
    error: Option<String>,
}

#[async_trait]
impl PushSender for FcmPush {
    async fn send(&self, message: PushMessage) -> Result<String, PushError> {
        let body = FcmRequest {
            to: message.token,
            notification: FcmNotification {
                title: message.title,
                body: message.body,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("authorization", format!("key={}", self.server_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| PushError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected(format!("HTTP {}: {}", status, text)));
        }

        let parsed: FcmResponse = response
            .json()
            .await
            .map_err(|e| PushError::Http(e.to_string()))?;

        match parsed.results.into_iter().next() {
            Some(FcmResult {
                message_id: Some(id),
                ..
            }) => Ok(id),
            Some(FcmResult {
                error: Some(err), ..
            }) => Err(PushError::Rejected(err)),
            _ => Ok(String::new()),
        }
    }
}
