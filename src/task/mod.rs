//! 任务层 - 带位置的任务记录与任务来源
//!
//! 监控引擎只把任务来源当作只读数据源，每个周期读取一次快照。

pub mod store;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::geo::{within_distance, GeofenceSpec};

pub use store::TaskStore;

/// 新任务的默认触发半径（米）
pub const DEFAULT_RADIUS_METERS: f64 = 200.0;
pub const MIN_RADIUS_METERS: f64 = 50.0;
pub const MAX_RADIUS_METERS: f64 = 1000.0;
pub const RADIUS_STEP_METERS: f64 = 50.0;

/// 把半径对齐到 50 米步长并夹到 [50, 1000]
pub fn normalize_radius(radius: f64) -> f64 {
    if !radius.is_finite() {
        return DEFAULT_RADIUS_METERS;
    }
    let snapped = (radius / RADIUS_STEP_METERS).round() * RADIUS_STEP_METERS;
    snapped.clamp(MIN_RADIUS_METERS, MAX_RADIUS_METERS)
}

/// 任务位置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// 任务记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub location: TaskLocation,
    /// 触发半径（米）
    pub radius: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// 创建新任务，ID 自动生成
    pub fn new(title: impl Into<String>, latitude: f64, longitude: f64, radius: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: None,
            completed: false,
            location: TaskLocation {
                latitude,
                longitude,
                address: None,
            },
            radius,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.location.address = Some(address.into());
        self
    }

    /// 地理围栏投影；已完成的任务没有围栏
    pub fn geofence(&self) -> Option<GeofenceSpec> {
        if self.completed {
            return None;
        }
        Some(GeofenceSpec::new(
            self.id.clone(),
            self.location.latitude,
            self.location.longitude,
            self.radius,
        ))
    }
}

/// 附带距离的任务（附近任务查询结果）
#[derive(Debug, Clone, Serialize)]
pub struct NearbyTask {
    pub task: Task,
    pub distance_meters: f64,
}

/// 从任务列表中找出 `max_distance` 米以内的任务，近的在前
pub fn find_nearby(tasks: &[Task], latitude: f64, longitude: f64, max_distance: f64) -> Vec<NearbyTask> {
    let mut nearby: Vec<NearbyTask> = tasks
        .iter()
        .filter_map(|task| {
            within_distance(
                latitude,
                longitude,
                task.location.latitude,
                task.location.longitude,
                max_distance,
            )
            .map(|distance_meters| NearbyTask {
                task: task.clone(),
                distance_meters,
            })
        })
        .collect();
    nearby.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
    nearby
}

/// 任务来源（外部协作者）
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// 所有未完成、未删除的任务
    async fn active_tasks(&self) -> Result<Vec<Task>>;

    /// 未完成任务的地理围栏
    async fn list_active_geofences(&self) -> Result<Vec<GeofenceSpec>> {
        Ok(self
            .active_tasks()
            .await?
            .iter()
            .filter_map(Task::geofence)
            .collect())
    }
}

/// 内存任务来源，供嵌入方（界面层）直接推送任务快照
#[derive(Default)]
pub struct MemoryTaskSource {
    tasks: RwLock<Vec<Task>>,
}

impl MemoryTaskSource {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
        }
    }

    /// 插入或替换同 ID 的任务
    pub fn upsert(&self, task: Task) {
        if let Ok(mut tasks) = self.tasks.write() {
            match tasks.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task,
                None => tasks.push(task),
            }
        }
    }

    pub fn remove(&self, task_id: &str) -> bool {
        self.tasks
            .write()
            .map(|mut tasks| {
                let before = tasks.len();
                tasks.retain(|t| t.id != task_id);
                tasks.len() != before
            })
            .unwrap_or(false)
    }

    pub fn set_completed(&self, task_id: &str, completed: bool) -> bool {
        self.tasks
            .write()
            .ok()
            .and_then(|mut tasks| {
                tasks.iter_mut().find(|t| t.id == task_id).map(|t| {
                    t.completed = completed;
                    t.updated_at = Some(Utc::now());
                })
            })
            .is_some()
    }
}

#[async_trait]
impl TaskSource for MemoryTaskSource {
    async fn active_tasks(&self) -> Result<Vec<Task>> {
        let tasks = self
            .tasks
            .read()
            .map_err(|_| anyhow::anyhow!("task list lock poisoned"))?;
        Ok(tasks.iter().filter(|t| !t.completed).cloned().collect())
    }
}
