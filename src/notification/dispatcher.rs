//! 通知分发器 - 投递通知并在成功后写入通知历史

use super::channel::{LocalNotification, NotificationChannel, NotificationError};
use super::history::{NotificationHistory, NotificationRecord};
use crate::geo::ProximityResult;
use crate::task::Task;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// 通知分发器
///
/// 通知历史只由分发器写入：每次投递成功写一次。
pub struct NotificationDispatcher {
    /// 所有注册的渠道
    channels: Vec<Arc<dyn NotificationChannel>>,
    history: Mutex<NotificationHistory>,
    /// 是否为 dry-run 模式（只记日志，不投递也不写历史）
    dry_run: bool,
    /// 最近分配的通知 ID
    last_id: AtomicI64,
}

/// 单次投递的结果
enum Delivery {
    Sent,
    DryRun,
}

impl NotificationDispatcher {
    /// 创建新的分发器
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            history: Mutex::new(NotificationHistory::new()),
            dry_run: false,
            last_id: AtomicI64::new(0),
        }
    }

    /// 设置 dry-run 模式
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 注册渠道
    pub fn register_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        info!(channel = channel.name(), "Registering notification channel");
        self.channels.push(channel);
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.register_channel(channel);
        self
    }

    /// 获取已注册的渠道数量
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// 获取已注册的渠道名称
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// 分配通知 ID：毫秒时间戳，同一毫秒内递增，保证唯一且单调
    fn next_notification_id(&self, now: DateTime<Utc>) -> i64 {
        let millis = now.timestamp_millis();
        let previous = self
            .last_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(millis.max(last + 1)))
            .unwrap_or_else(|last| last);
        millis.max(previous + 1)
    }

    fn history_guard(&self) -> MutexGuard<'_, NotificationHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 在通知历史上执行只读操作
    pub fn with_history<R>(&self, f: impl FnOnce(&NotificationHistory) -> R) -> R {
        f(&self.history_guard())
    }

    pub fn last_record(&self, task_id: &str) -> Option<NotificationRecord> {
        self.history_guard().get(task_id).cloned()
    }

    /// 任务完成或删除时清除记录
    pub fn forget(&self, task_id: &str) -> bool {
        let removed = self.history_guard().remove(task_id).is_some();
        if removed {
            debug!(task_id = %task_id, "Notification record removed");
        }
        removed
    }

    /// 清除不在活动任务集合中的记录
    pub fn retain_tasks(&self, active: &HashSet<String>) -> usize {
        self.history_guard().retain_tasks(active)
    }

    /// 向每个渠道申请权限，全部允许时返回 true
    pub async fn request_permissions(&self) -> bool {
        let mut all_granted = true;
        for channel in &self.channels {
            match channel.request_permission().await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(channel = channel.name(), "Notification permission not granted");
                    all_granted = false;
                }
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, "Error requesting notification permission");
                    all_granted = false;
                }
            }
        }
        all_granted
    }

    /// 投递任务通知，成功后记录 `last_fired_at = now`
    pub async fn dispatch(&self, task: &Task, result: &ProximityResult) -> Result<(), NotificationError> {
        self.dispatch_at(task, result, Utc::now()).await
    }

    /// 同 `dispatch`，时间由调用方给出
    pub async fn dispatch_at(
        &self,
        task: &Task,
        result: &ProximityResult,
        now: DateTime<Utc>,
    ) -> Result<(), NotificationError> {
        let mut notification = LocalNotification::for_task(task, now);
        notification.id = self.next_notification_id(now);
        match self.deliver(&notification).await? {
            Delivery::Sent => {
                self.history_guard().record(&task.id, now);
                info!(
                    task_id = %task.id,
                    distance_m = result.distance_meters.round(),
                    "Task nearby notification sent"
                );
            }
            Delivery::DryRun => {}
        }
        Ok(())
    }

    /// 普通通知，不经过去重，也不写历史
    pub async fn send_general(&self, title: &str, body: &str) -> Result<(), NotificationError> {
        let now = Utc::now();
        let mut notification = LocalNotification::general(title, body, now);
        notification.id = self.next_notification_id(now);
        self.deliver(&notification).await.map(|_| ())
    }

    /// 投递到所有渠道，至少一个成功即视为成功
    async fn deliver(&self, notification: &LocalNotification) -> Result<Delivery, NotificationError> {
        if self.channels.is_empty() {
            return Err(NotificationError::NoChannels);
        }

        if self.dry_run {
            for channel in &self.channels {
                info!(channel = channel.name(), title = %notification.title, "[DRY-RUN] Would send notification");
            }
            return Ok(Delivery::DryRun);
        }

        let mut delivered = false;
        let mut failures = Vec::new();
        for channel in &self.channels {
            match channel.schedule(notification).await {
                Ok(()) => delivered = true,
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, "Channel send failed");
                    failures.push((channel.name().to_string(), e.to_string()));
                }
            }
        }

        if delivered {
            return Ok(Delivery::Sent);
        }

        let (names, reasons): (Vec<String>, Vec<String>) = failures.into_iter().unzip();
        Err(NotificationError::delivery(names.join(","), reasons.join("; ")))
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
