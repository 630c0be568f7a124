//! 本地文件渠道 - 将所有通知写入 JSONL 文件

use async_trait::async_trait;
use tracing::{info, warn};

use crate::notification::channel::{LocalNotification, NotificationChannel, NotificationError};
use crate::notification::store::{LoggedNotification, NotificationLog};

/// 本地文件渠道 - 记录所有通知到本地文件（桌面环境的“通知中心”）
pub struct LocalFileChannel {
    log: NotificationLog,
}

impl LocalFileChannel {
    pub fn new(log: NotificationLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &NotificationLog {
        &self.log
    }
}

impl Default for LocalFileChannel {
    fn default() -> Self {
        Self::new(NotificationLog::default())
    }
}

#[async_trait]
impl NotificationChannel for LocalFileChannel {
    fn name(&self) -> &str {
        "local_file"
    }

    async fn schedule(&self, notification: &LocalNotification) -> Result<(), NotificationError> {
        // 本地文件写入很快，直接同步执行
        match self.log.append(&LoggedNotification::from(notification)) {
            Ok(()) => {
                info!(
                    channel = "local_file",
                    title = %notification.title,
                    body = %notification.body,
                    "Notification delivered"
                );
                Ok(())
            }
            Err(e) => {
                warn!(channel = "local_file", error = %e, "Failed to write notification to local file");
                Err(NotificationError::delivery("local_file", e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_local_file_channel_appends() {
        let dir = tempfile::tempdir().unwrap();
        let channel = LocalFileChannel::new(NotificationLog::new(dir.path().join("n.jsonl")));

        let n = LocalNotification::general("Hello", "World", Utc::now());
        channel.schedule(&n).await.unwrap();

        let recent = channel.log().read_recent(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "Hello");
        assert!(channel.request_permission().await.unwrap());
    }

    #[tokio::test]
    async fn test_unwritable_path_is_delivery_error() {
        let dir = tempfile::tempdir().unwrap();
        // 目录当作文件路径，写入必然失败
        let channel = LocalFileChannel::new(NotificationLog::new(dir.path()));

        let n = LocalNotification::general("Hello", "World", Utc::now());
        let err = channel.schedule(&n).await.unwrap_err();
        assert!(matches!(err, NotificationError::Delivery { .. }));
    }
}
