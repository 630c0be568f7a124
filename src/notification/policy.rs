//! 通知策略 - 决定哪些在范围内的任务现在应该通知
//!
//! ## 规则
//! 1. 必须在围栏内（`inside == true`）
//! 2. 从未通知过，或距上次通知已过冷却窗口（默认 15 分钟）
//! 3. 输出按距离升序，距离相同时保持输入顺序
//!
//! 纯函数，不修改历史；历史只在投递成功后由分发器写入。

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::history::NotificationHistory;
use crate::geo::ProximityResult;

/// 默认冷却窗口
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(900);

/// 选中的通知
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDecision {
    pub task_id: String,
    pub result: ProximityResult,
}

/// 通知策略
#[derive(Debug, Clone)]
pub struct NotificationPolicy {
    cooldown: Duration,
}

impl NotificationPolicy {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// 单个结果是否应该通知
    pub fn is_eligible(
        &self,
        result: &ProximityResult,
        history: &NotificationHistory,
        now: DateTime<Utc>,
    ) -> bool {
        if !result.inside {
            return false;
        }
        let Some(record) = history.get(&result.task_id) else {
            return true;
        };
        if self.cooldown.is_zero() {
            return true;
        }
        // 上次通知时间在未来（时钟回拨）时视为仍在冷却
        match (now - record.last_fired_at).to_std() {
            Ok(elapsed) => elapsed >= self.cooldown,
            Err(_) => false,
        }
    }

    /// 从本周期的判定结果中选出要通知的任务，近的在前
    pub fn select(
        &self,
        results: &[ProximityResult],
        history: &NotificationHistory,
        now: DateTime<Utc>,
    ) -> Vec<NotificationDecision> {
        let mut decisions: Vec<NotificationDecision> = results
            .iter()
            .filter(|result| self.is_eligible(result, history, now))
            .map(|result| NotificationDecision {
                task_id: result.task_id.clone(),
                result: result.clone(),
            })
            .collect();
        decisions.sort_by(|a, b| a.result.distance_meters.total_cmp(&b.result.distance_meters));
        decisions
    }
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
