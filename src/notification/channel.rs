//! 通知渠道 trait 定义

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::Task;

/// 任务通知的默认正文（任务没有描述时使用）
pub const DEFAULT_TASK_BODY: &str = "You are near a location with a pending task";
/// 任务通知提示音
pub const TASK_SOUND: &str = "beep.wav";

/// 通知错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotificationError {
    /// 平台拒绝投递（例如权限被撤销）
    #[error("notification delivery failed on {channel}: {reason}")]
    Delivery { channel: String, reason: String },
    /// 没有注册任何渠道
    #[error("no notification channel registered")]
    NoChannels,
}

impl NotificationError {
    pub fn delivery(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        NotificationError::Delivery {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

/// 立即投递的本地通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalNotification {
    /// 通知 ID（毫秒时间戳）
    pub id: i64,
    pub title: String,
    pub body: String,
    /// 投递时间，总是“现在”
    pub schedule_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// 关联任务 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl LocalNotification {
    /// 任务靠近通知："Task Nearby: <title>"
    pub fn for_task(task: &Task, now: DateTime<Utc>) -> Self {
        let body = task
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(DEFAULT_TASK_BODY)
            .to_string();
        Self {
            id: now.timestamp_millis(),
            title: format!("Task Nearby: {}", task.title),
            body,
            schedule_at: now,
            sound: Some(TASK_SOUND.to_string()),
            task_id: Some(task.id.clone()),
        }
    }

    /// 普通通知，不参与去重
    pub fn general(title: impl Into<String>, body: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: now.timestamp_millis(),
            title: title.into(),
            body: body.into(),
            schedule_at: now,
            sound: None,
            task_id: None,
        }
    }
}

/// 通知渠道（平台通知能力）
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    /// 申请通知权限，返回是否允许展示
    async fn request_permission(&self) -> Result<bool, NotificationError> {
        Ok(true)
    }

    /// 立即投递
    async fn schedule(&self, notification: &LocalNotification) -> Result<(), NotificationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_notification_content() {
        let now = Utc::now();
        let task = Task::new("Buy milk", 0.0, 0.0, 200.0)
            .with_id("t1")
            .with_description("2 litres");
        let n = LocalNotification::for_task(&task, now);
        assert_eq!(n.title, "Task Nearby: Buy milk");
        assert_eq!(n.body, "2 litres");
        assert_eq!(n.task_id.as_deref(), Some("t1"));
        assert_eq!(n.sound.as_deref(), Some("beep.wav"));
        assert_eq!(n.id, now.timestamp_millis());
    }

    #[test]
    fn test_task_notification_default_body() {
        let task = Task::new("Return book", 0.0, 0.0, 200.0);
        let n = LocalNotification::for_task(&task, Utc::now());
        assert_eq!(n.body, DEFAULT_TASK_BODY);

        let blank = task.with_description("  ");
        assert_eq!(LocalNotification::for_task(&blank, Utc::now()).body, DEFAULT_TASK_BODY);
    }

    #[test]
    fn test_general_notification() {
        let n = LocalNotification::general("Hello", "World", Utc::now());
        assert!(n.task_id.is_none());
        assert!(n.sound.is_none());
    }
}
