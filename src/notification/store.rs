//! 通知日志 - 本地 JSONL 文件读写

use anyhow::Result;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::channel::LocalNotification;

/// 已投递通知（JSONL 格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedNotification {
    /// ISO8601 时间戳
    pub ts: DateTime<Utc>,
    pub notification_id: i64,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl From<&LocalNotification> for LoggedNotification {
    fn from(n: &LocalNotification) -> Self {
        Self {
            ts: n.schedule_at,
            notification_id: n.id,
            title: n.title.clone(),
            body: n.body.clone(),
            task_id: n.task_id.clone(),
        }
    }
}

const MAX_NOTIFICATIONS: usize = 200;
const KEEP_AFTER_CLEANUP: usize = 100;
const CLEANUP_CHECK_INTERVAL: usize = 10;

/// 通知日志
pub struct NotificationLog {
    path: PathBuf,
    write_count: AtomicUsize,
}

impl NotificationLog {
    /// 默认路径 `~/.config/geotask/notifications.jsonl`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("geotask")
            .join("notifications.jsonl")
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_count: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加记录（带文件锁）
    pub fn append(&self, record: &LoggedNotification) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        file.lock_exclusive()?;
        let mut file = file;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        file.unlock()?;

        self.maybe_cleanup();

        Ok(())
    }

    /// 读取最近 N 条记录（按时间排序）
    pub fn read_recent(&self, n: usize) -> Vec<LoggedNotification> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let records: Vec<LoggedNotification> = BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();

        let start = records.len().saturating_sub(n);
        let mut recent = records[start..].to_vec();
        recent.sort_by_key(|r| r.ts);
        recent
    }

    /// 定期检查并清理
    fn maybe_cleanup(&self) {
        let count = self.write_count.fetch_add(1, Ordering::Relaxed);
        if count % CLEANUP_CHECK_INTERVAL != 0 {
            return;
        }

        if let Ok(metadata) = fs::metadata(&self.path) {
            // 估算行数：平均每行 150 字节
            let estimated_lines = metadata.len() as usize / 150;
            if estimated_lines > MAX_NOTIFICATIONS {
                let _ = self.cleanup();
            }
        }
    }

    /// 保留最近的记录
    fn cleanup(&self) -> Result<()> {
        let file = File::open(&self.path)?;
        file.lock_exclusive()?;

        let records: Vec<String> = BufReader::new(&file)
            .lines()
            .map_while(|line| line.ok())
            .filter(|line| serde_json::from_str::<LoggedNotification>(line).is_ok())
            .collect();

        if records.len() <= MAX_NOTIFICATIONS {
            file.unlock()?;
            return Ok(());
        }

        let start = records.len().saturating_sub(KEEP_AFTER_CLEANUP);
        let temp_path = self.path.with_extension("tmp");
        {
            let mut temp_file = File::create(&temp_path)?;
            for line in &records[start..] {
                writeln!(temp_file, "{}", line)?;
            }
        }

        // 原子替换
        fs::rename(&temp_path, &self.path)?;

        file.unlock()?;
        Ok(())
    }
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> LoggedNotification {
        LoggedNotification {
            ts: Utc::now(),
            notification_id: Utc::now().timestamp_millis(),
            title: title.to_string(),
            body: "body".to_string(),
            task_id: None,
        }
    }

    #[test]
    fn test_read_recent_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = NotificationLog::new(dir.path().join("none.jsonl"));
        assert!(log.read_recent(10).is_empty());
    }

    #[test]
    fn test_append_and_read_recent() {
        let dir = tempfile::tempdir().unwrap();
        let log = NotificationLog::new(dir.path().join("nested").join("n.jsonl"));
        for i in 0..5 {
            log.append(&record(&format!("n{}", i))).unwrap();
        }

        let recent = log.read_recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].title, "n4");
    }

    #[test]
    fn test_cleanup_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let log = NotificationLog::new(dir.path().join("n.jsonl"));
        for i in 0..(MAX_NOTIFICATIONS + 50) {
            log.append(&record(&format!("n{}", i))).unwrap();
        }
        log.cleanup().unwrap();

        let all = log.read_recent(usize::MAX);
        assert_eq!(all.len(), KEEP_AFTER_CLEANUP);
        assert_eq!(all.last().unwrap().title, format!("n{}", MAX_NOTIFICATIONS + 49));
    }
}
