use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("http error: {0}")]
    Http(String),
    #[error("queue rejected task: {0}")]
    Rejected(String),
}

/// A delayed HTTP callback: the queue service POSTs `payload` to `url` at or
/// after `schedule_time`, with at-least-once delivery.
#[derive(Debug, Clone)]
pub struct DelayedTask {
    pub url: String,
    pub payload: serde_json::Value,
    pub schedule_time: DateTime<Utc>,
}

/// The delayed-task-execution service used for reminder delivery.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: DelayedTask) -> Result<(), QueueError>;
}

/// HTTP client for the queue service's task-creation API.
pub struct HttpTaskQueue {
    client: reqwest::Client,
    queue_url: String,
}

impl HttpTaskQueue {
    pub fn new(queue_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            queue_url,
        }
    }
}

// Queue wire format: target URL, method, headers, base64 body, RFC 3339 fire time.

#[derive(Debug, Serialize)]
struct CreateTaskRequest {
    #[serde(rename = "httpRequest")]
    http_request: HttpRequestSpec,
    #[serde(rename = "scheduleTime")]
    schedule_time: String,
}

#[derive(Debug, Serialize)]
struct HttpRequestSpec {
    #[serde(rename = "httpMethod")]
    http_method: String,
    url: String,
    /// Base64-encoded JSON payload
    body: String,
    headers: HttpHeaders,
}

#[derive(Debug, Serialize)]
struct HttpHeaders {
    #[serde(rename = "Content-Type")]
    content_type: String,
}

fn build_create_task_request(task: &DelayedTask) -> CreateTaskRequest {
    let body = base64::engine::general_purpose::STANDARD.encode(task.payload.to_string());
    CreateTaskRequest {
        http_request: HttpRequestSpec {
            http_method: "POST".to_string(),
            url: task.url.clone(),
            body,
            headers: HttpHeaders {
                content_type: "application/json".to_string(),
            },
        },
        schedule_time: task.schedule_time.to_rfc3339(),
    }
}

#[async_trait]
impl TaskQueue for HttpTaskQueue {
    async fn enqueue(&self, task: DelayedTask) -> Result<(), QueueError> {
        let request = build_create_task_request(&task);

        let response = self
            .client
            .post(&self.queue_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| QueueError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(QueueError::Rejected(format!("HTTP {}: {}", status, text)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn create_task_request_encodes_payload_as_base64() {
        let task = DelayedTask {
            url: "https://api.example.com/internal/reminders/deliver".to_string(),
            payload: serde_json::json!({"taskId": "abc", "deviceToken": "tok"}),
            schedule_time: Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap(),
        };

        let request = build_create_task_request(&task);
        assert_eq!(request.http_request.http_method, "POST");
        assert_eq!(request.http_request.url, task.url);
        assert_eq!(request.schedule_time, "2025-08-01T12:00:00+00:00");

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&request.http_request.body)
            .unwrap();
        let round_tripped: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(round_tripped, task.payload);
    }
}
