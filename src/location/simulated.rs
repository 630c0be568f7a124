//! 模拟定位平台 - 固定坐标或 JSONL 轨迹回放
//!
//! 桌面/CLI 环境没有 GPS，用这个平台代替设备定位。
//! 轨迹文件每行一个 JSON 对象：
//! ```text
//! {"latitude": 31.2304, "longitude": 121.4737, "accuracy_meters": 12.0}
//! ```

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{LocationError, LocationUpdate, PositionPlatform, WatchHandle, WatchOptions};
use crate::geo::Position;

/// 轨迹点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
}

impl TrackPoint {
    fn to_position(&self) -> Position {
        let position = Position::new(self.latitude, self.longitude);
        match self.accuracy_meters {
            Some(accuracy) => position.with_accuracy(accuracy),
            None => position,
        }
    }
}

/// 模拟定位平台
pub struct SimulatedPlatform {
    name: String,
    points: Vec<TrackPoint>,
    cursor: Mutex<usize>,
    /// 轨迹耗尽后是否一直停留在最后一个点
    hold_last: bool,
    /// 持续监听的推送间隔
    emit_interval: Duration,
    watches: Mutex<HashMap<WatchHandle, CancellationToken>>,
    next_watch: AtomicU64,
}

impl SimulatedPlatform {
    /// 固定坐标，监听时按间隔重复推送同一位置
    pub fn fixed(latitude: f64, longitude: f64) -> Self {
        Self::from_points(
            "fixed",
            vec![TrackPoint {
                latitude,
                longitude,
                accuracy_meters: None,
            }],
            true,
        )
    }

    /// 从 JSONL 轨迹文件加载；无法解析的行被跳过
    pub fn from_track_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let points: Vec<TrackPoint> = BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(&line) {
                Ok(point) => Some(point),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed track line");
                    None
                }
            })
            .collect();

        if points.is_empty() {
            return Err(anyhow!("轨迹文件没有有效的定位点: {}", path.display()));
        }

        Ok(Self::from_points("track", points, false))
    }

    fn from_points(name: &str, points: Vec<TrackPoint>, hold_last: bool) -> Self {
        Self {
            name: name.to_string(),
            points,
            cursor: Mutex::new(0),
            hold_last,
            emit_interval: Duration::from_secs(1),
            watches: Mutex::new(HashMap::new()),
            next_watch: AtomicU64::new(1),
        }
    }

    /// 设置监听推送间隔
    pub fn with_emit_interval(mut self, interval: Duration) -> Self {
        self.emit_interval = interval;
        self
    }

    /// 轨迹耗尽后停留在最后一个点
    pub fn holding_last(mut self) -> Self {
        self.hold_last = true;
        self
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// 当前活动的监听数量
    pub fn active_watches(&self) -> usize {
        self.watches.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// 取下一个点；轨迹耗尽且不停留时返回 None
    fn advance(&self) -> Option<TrackPoint> {
        let mut cursor = self.cursor.lock().ok()?;
        if *cursor < self.points.len() {
            let point = self.points[*cursor].clone();
            *cursor += 1;
            Some(point)
        } else if self.hold_last {
            self.points.last().cloned()
        } else {
            None
        }
    }
}

#[async_trait]
impl PositionPlatform for SimulatedPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        !self.points.is_empty()
    }

    async fn get_current_position(&self, _timeout: Duration) -> Result<Position, LocationError> {
        self.advance()
            .or_else(|| self.points.last().cloned())
            .map(|p| p.to_position())
            .ok_or(LocationError::Unavailable)
    }

    async fn watch_position(
        &self,
        _options: &WatchOptions,
        sink: mpsc::UnboundedSender<LocationUpdate>,
    ) -> Result<WatchHandle, LocationError> {
        let handle = WatchHandle(format!(
            "{}-watch-{}",
            self.name,
            self.next_watch.fetch_add(1, Ordering::SeqCst)
        ));
        let cancel = CancellationToken::new();

        // 推送任务不能借用 self，先把要回放的点取出来
        let mut pending = Vec::new();
        while let Some(point) = self.advance() {
            pending.push(point);
            if self.hold_last && pending.len() >= self.points.len() {
                break;
            }
        }
        let repeat_last = self.hold_last;
        let interval = self.emit_interval;
        let token = cancel.clone();
        let handle_name = handle.0.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut queue = pending.into_iter();
            let mut last: Option<TrackPoint> = None;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let point = match queue.next() {
                            Some(point) => point,
                            None if repeat_last => match last.clone() {
                                Some(point) => point,
                                None => break,
                            },
                            None => break,
                        };
                        if sink.send(Ok(point.to_position())).is_err() {
                            break;
                        }
                        last = Some(point);
                    }
                }
            }
            debug!(handle = %handle_name, "Simulated watch finished");
        });

        if let Ok(mut watches) = self.watches.lock() {
            watches.insert(handle.clone(), cancel);
        }
        Ok(handle)
    }

    async fn clear_watch(&self, handle: &WatchHandle) {
        let removed = self.watches.lock().ok().and_then(|mut w| w.remove(handle));
        if let Some(cancel) = removed {
            cancel.cancel();
        }
    }
}
