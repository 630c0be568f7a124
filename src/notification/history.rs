//! 通知历史 - 每个任务最近一次成功通知的时间

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// 通知记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub task_id: String,
    pub last_fired_at: DateTime<Utc>,
}

/// 通知历史：task_id -> 最近一次通知
#[derive(Debug, Clone, Default)]
pub struct NotificationHistory {
    records: HashMap<String, NotificationRecord>,
}

impl NotificationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &str) -> Option<&NotificationRecord> {
        self.records.get(task_id)
    }

    /// 写入或覆盖
    pub fn record(&mut self, task_id: &str, fired_at: DateTime<Utc>) {
        self.records.insert(
            task_id.to_string(),
            NotificationRecord {
                task_id: task_id.to_string(),
                last_fired_at: fired_at,
            },
        );
    }

    pub fn remove(&mut self, task_id: &str) -> Option<NotificationRecord> {
        self.records.remove(task_id)
    }

    /// 只保留仍然活动的任务
    pub fn retain_tasks(&mut self, active: &HashSet<String>) -> usize {
        let before = self.records.len();
        self.records.retain(|task_id, _| active.contains(task_id));
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.records.values()
    }
}
