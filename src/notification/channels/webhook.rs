//! Webhook 渠道 - 通过 HTTP POST 投递通知

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::notification::channel::{LocalNotification, NotificationChannel, NotificationError};

/// Webhook 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// 接收通知的 URL
    pub url: String,
    /// Bearer token（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// 超时时间 (秒)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Webhook 请求载荷
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    id: i64,
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<&'a str>,
    schedule_at: String,
}

/// Webhook 渠道
#[derive(Debug)]
pub struct WebhookChannel {
    client: Client,
    config: WebhookConfig,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> Result<Self, String> {
        if config.url.trim().is_empty() {
            return Err("webhook url is required".to_string());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn schedule(&self, notification: &LocalNotification) -> Result<(), NotificationError> {
        let payload = WebhookPayload {
            id: notification.id,
            title: &notification.title,
            body: &notification.body,
            sound: notification.sound.as_deref(),
            task_id: notification.task_id.as_deref(),
            schedule_at: notification.schedule_at.to_rfc3339(),
        };

        let mut request = self.client.post(&self.config.url).json(&payload);
        if let Some(token) = self.config.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::delivery("webhook", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotificationError::delivery("webhook", format!("HTTP status {}", status)))
        }
    }
}
