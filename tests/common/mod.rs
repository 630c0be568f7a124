//! 集成测试共用的可控定位平台与记录型通知渠道

#![allow(dead_code)]

use async_trait::async_trait;
use geotask_monitor::geo::EARTH_RADIUS_METERS;
use geotask_monitor::{
    LocalNotification, LocationError, LocationUpdate, NotificationChannel, NotificationError,
    Position, PositionPlatform, Task, WatchHandle, WatchOptions,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// 赤道上某点正北方向 `meters` 米处的纬度
pub fn lat_north_of_equator(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_METERS).to_degrees()
}

/// 距原点 `meters` 米、半径 `radius` 的任务
pub fn task_at(id: &str, meters: f64, radius: f64) -> Task {
    Task::new(id, lat_north_of_equator(meters), 0.0, radius).with_id(id)
}

/// 脚本化定位平台
///
/// - 单次定位返回 `set_position` 设置的位置，`block()` 后会一直挂起直到 `release()`
/// - 持续监听的推送完全由测试驱动：`push` / `fail`
pub struct ScriptedPlatform {
    available: AtomicBool,
    position: Mutex<Result<Position, LocationError>>,
    gate: watch::Sender<bool>,
    fetch_calls: AtomicUsize,
    watch_calls: AtomicUsize,
    clear_calls: AtomicUsize,
    watches: Mutex<HashMap<WatchHandle, mpsc::UnboundedSender<LocationUpdate>>>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            available: AtomicBool::new(true),
            position: Mutex::new(Ok(Position::new(0.0, 0.0))),
            gate,
            fetch_calls: AtomicUsize::new(0),
            watch_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
            watches: Mutex::new(HashMap::new()),
        }
    }

    pub fn unavailable() -> Self {
        let platform = Self::new();
        platform.available.store(false, Ordering::SeqCst);
        platform
    }

    pub fn set_position(&self, latitude: f64, longitude: f64) {
        *self.position.lock().unwrap() = Ok(Position::new(latitude, longitude));
    }

    pub fn set_error(&self, error: LocationError) {
        *self.position.lock().unwrap() = Err(error);
    }

    /// 之后的单次定位挂起
    pub fn block(&self) {
        self.gate.send_replace(false);
    }

    /// 放行所有挂起的单次定位
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    pub fn active_watches(&self) -> usize {
        self.watches.lock().unwrap().len()
    }

    /// 向所有活动监听推送一个位置
    pub fn push(&self, latitude: f64, longitude: f64) {
        for sink in self.watches.lock().unwrap().values() {
            let _ = sink.send(Ok(Position::new(latitude, longitude)));
        }
    }

    /// 向所有活动监听推送一个错误
    pub fn fail(&self, error: LocationError) {
        for sink in self.watches.lock().unwrap().values() {
            let _ = sink.send(Err(error.clone()));
        }
    }
}

#[async_trait]
impl PositionPlatform for ScriptedPlatform {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn get_current_position(&self, _timeout: Duration) -> Result<Position, LocationError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        self.position.lock().unwrap().clone()
    }

    async fn watch_position(
        &self,
        _options: &WatchOptions,
        sink: mpsc::UnboundedSender<LocationUpdate>,
    ) -> Result<WatchHandle, LocationError> {
        let n = self.watch_calls.fetch_add(1, Ordering::SeqCst);
        let handle = WatchHandle(format!("scripted-{}", n));
        self.watches.lock().unwrap().insert(handle.clone(), sink);
        Ok(handle)
    }

    async fn clear_watch(&self, handle: &WatchHandle) {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.watches.lock().unwrap().remove(handle);
    }
}

/// 记录所有投递的通知渠道
pub struct RecordingChannel {
    sent: Mutex<Vec<LocalNotification>>,
    failing_tasks: Mutex<HashSet<String>>,
    permission: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing_tasks: Mutex::new(HashSet::new()),
            permission: AtomicBool::new(true),
        }
    }

    pub fn denying_permission() -> Self {
        let channel = Self::new();
        channel.permission.store(false, Ordering::SeqCst);
        channel
    }

    /// 该任务的通知投递失败
    pub fn fail_for(&self, task_id: &str) {
        self.failing_tasks.lock().unwrap().insert(task_id.to_string());
    }

    pub fn recover(&self, task_id: &str) {
        self.failing_tasks.lock().unwrap().remove(task_id);
    }

    pub fn sent(&self) -> Vec<LocalNotification> {
        self.sent.lock().unwrap().clone()
    }

    /// 已投递通知的任务 ID（按投递顺序）
    pub fn sent_task_ids(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| n.task_id.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn request_permission(&self) -> Result<bool, NotificationError> {
        Ok(self.permission.load(Ordering::SeqCst))
    }

    async fn schedule(&self, notification: &LocalNotification) -> Result<(), NotificationError> {
        if let Some(task_id) = &notification.task_id {
            if self.failing_tasks.lock().unwrap().contains(task_id) {
                return Err(NotificationError::delivery("recording", "permission revoked"));
            }
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
