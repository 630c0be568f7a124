//! 任务存储 - tasks.json 的增删改查（带文件锁）

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{find_nearby, NearbyTask, Task, TaskSource};

/// tasks.json 结构
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct TasksFile {
    tasks: Vec<Task>,
}

/// 部分更新
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub completed: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<Option<String>>,
    pub radius: Option<f64>,
}

/// 任务存储
pub struct TaskStore {
    data_dir: PathBuf,
}

impl TaskStore {
    /// 默认数据目录 `~/.config/geotask`
    pub fn new() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config/geotask");
        Self::with_data_dir(data_dir)
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let _ = fs::create_dir_all(&data_dir);
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn tasks_file_path(&self) -> PathBuf {
        self.data_dir.join("tasks.json")
    }

    fn lock_file_path(&self) -> PathBuf {
        self.data_dir.join("tasks.json.lock")
    }

    fn read_tasks_file_internal(&self) -> Result<TasksFile> {
        let path = self.tasks_file_path();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(TasksFile::default())
        }
    }

    /// 先写临时文件再 rename，避免读到半截文件
    fn write_tasks_file_internal(&self, file: &TasksFile) -> Result<()> {
        let path = self.tasks_file_path();
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, serde_json::to_string_pretty(file)?)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn open_lock_file(&self) -> Result<fs::File> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(self.lock_file_path())?)
    }

    /// 排他锁下的读-改-写
    fn with_locked_tasks_file<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut TasksFile) -> Result<T>,
    {
        let lock_file = self.open_lock_file()?;
        lock_file.lock_exclusive()?;

        let result = (|| {
            let mut file = self.read_tasks_file_internal()?;
            let result = operation(&mut file)?;
            self.write_tasks_file_internal(&file)?;
            Ok(result)
        })();

        let _ = lock_file.unlock();
        result
    }

    /// 共享锁下只读
    fn with_locked_tasks_file_read<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&TasksFile) -> Result<T>,
    {
        let lock_file = self.open_lock_file()?;
        lock_file.lock_shared()?;

        let result = (|| {
            let file = self.read_tasks_file_internal()?;
            operation(&file)
        })();

        let _ = lock_file.unlock();
        result
    }

    /// 新增任务，返回任务 ID
    pub fn add(&self, task: Task) -> Result<String> {
        if !(task.radius.is_finite() && task.radius > 0.0) {
            return Err(anyhow!("触发半径必须大于 0: {}", task.radius));
        }
        let id = task.id.clone();
        self.with_locked_tasks_file(|file| {
            if file.tasks.iter().any(|t| t.id == task.id) {
                return Err(anyhow!("任务已存在: {}", task.id));
            }
            file.tasks.push(task);
            Ok(())
        })?;
        info!(task_id = %id, "Task added");
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Option<Task>> {
        self.with_locked_tasks_file_read(|file| {
            Ok(file.tasks.iter().find(|t| t.id == id).cloned())
        })
    }

    /// 全部任务（按创建时间排序）
    pub fn list(&self) -> Result<Vec<Task>> {
        let mut tasks = self.with_locked_tasks_file_read(|file| Ok(file.tasks.clone()))?;
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    /// 部分更新，自动写入 updated_at
    pub fn update(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        if let Some(radius) = patch.radius {
            if !(radius.is_finite() && radius > 0.0) {
                return Err(anyhow!("触发半径必须大于 0: {}", radius));
            }
        }
        let updated = self.with_locked_tasks_file(|file| {
            let task = file
                .tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| anyhow!("任务不存在: {}", id))?;

            if let Some(title) = patch.title {
                task.title = title;
            }
            if let Some(description) = patch.description {
                task.description = description;
            }
            if let Some(completed) = patch.completed {
                task.completed = completed;
            }
            if let Some(latitude) = patch.latitude {
                task.location.latitude = latitude;
            }
            if let Some(longitude) = patch.longitude {
                task.location.longitude = longitude;
            }
            if let Some(address) = patch.address {
                task.location.address = address;
            }
            if let Some(radius) = patch.radius {
                task.radius = radius;
            }
            task.updated_at = Some(Utc::now());
            Ok(task.clone())
        })?;
        debug!(task_id = %id, "Task updated");
        Ok(updated)
    }

    pub fn set_completed(&self, id: &str, completed: bool) -> Result<Task> {
        self.update(
            id,
            TaskPatch {
                completed: Some(completed),
                ..Default::default()
            },
        )
    }

    /// 删除任务，返回是否存在
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.with_locked_tasks_file(|file| {
            let before = file.tasks.len();
            file.tasks.retain(|t| t.id != id);
            Ok(file.tasks.len() != before)
        })?;
        if removed {
            info!(task_id = %id, "Task deleted");
        }
        Ok(removed)
    }

    /// 指定坐标附近的任务（含已完成），近的在前
    pub fn find_nearby(&self, latitude: f64, longitude: f64, max_distance: f64) -> Result<Vec<NearbyTask>> {
        let tasks = self.list()?;
        Ok(find_nearby(&tasks, latitude, longitude, max_distance))
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskSource for TaskStore {
    async fn active_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.list()?.into_iter().filter(|t| !t.completed).collect())
    }
}
