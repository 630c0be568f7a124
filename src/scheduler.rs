//! 轮询调度器 - 固定间隔驱动评估周期
//!
//! 每个周期：取定位 → 围栏判定 → 通知策略 → 逐个投递。
//! 同一时刻最多一个周期在执行；周期未结束时到来的 tick 直接丢弃，不排队。

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::geo::{evaluate, Position};
use crate::location::{LocationError, LocationProvider, WatchState};
use crate::notification::{NotificationDispatcher, NotificationPolicy};
use crate::task::TaskSource;

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// 每个周期的定位来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionMode {
    /// 每个周期单次定位
    #[default]
    OneShot,
    /// 读取持续监听得到的最近定位（非阻塞）
    LatestFromStream,
}

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// 周期被跳过的原因
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// 单次定位失败
    Location(LocationError),
    /// 持续监听还没有任何定位
    NoFix,
    /// 持续监听会话已失败，需要重新 start_watching
    WatchFailed,
    /// 任务来源读取失败
    TaskSource(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Location(e) => write!(f, "{}", e),
            SkipReason::NoFix => write!(f, "no position fix yet"),
            SkipReason::WatchFailed => write!(f, "location watch session failed"),
            SkipReason::TaskSource(e) => write!(f, "task source error: {}", e),
        }
    }
}

/// 单个周期的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub position: Option<Position>,
    /// 参与判定的围栏数
    pub evaluated: usize,
    /// 在围栏内的任务数
    pub inside: usize,
    /// 投递成功的任务（按投递顺序）
    pub notified: Vec<String>,
    /// 投递失败的任务
    pub failed: Vec<String>,
    pub skipped: Option<SkipReason>,
}

/// tick 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed(CycleReport),
    /// 上一个周期仍在执行
    Skipped,
}

/// 持有期间表示有周期在执行，drop 时释放
pub struct CyclePermit {
    busy: Arc<watch::Sender<bool>>,
}

impl Drop for CyclePermit {
    fn drop(&mut self) {
        self.busy.send_replace(false);
    }
}

/// 执行评估周期
pub struct CycleRunner {
    location: Arc<LocationProvider>,
    tasks: Arc<dyn TaskSource>,
    dispatcher: Arc<NotificationDispatcher>,
    policy: NotificationPolicy,
    mode: PositionMode,
    /// 在途标记
    busy: Arc<watch::Sender<bool>>,
}

impl CycleRunner {
    pub fn new(
        location: Arc<LocationProvider>,
        tasks: Arc<dyn TaskSource>,
        dispatcher: Arc<NotificationDispatcher>,
        policy: NotificationPolicy,
        mode: PositionMode,
    ) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            location,
            tasks,
            dispatcher,
            policy,
            mode,
            busy: Arc::new(busy),
        }
    }

    pub fn mode(&self) -> PositionMode {
        self.mode
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    /// 尝试占用在途标记；已有周期在执行时返回 None
    pub fn try_begin(&self) -> Option<CyclePermit> {
        let acquired = self.busy.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        acquired.then(|| CyclePermit {
            busy: self.busy.clone(),
        })
    }

    /// 执行一次受保护的周期
    pub async fn tick(&self) -> TickOutcome {
        match self.try_begin() {
            Some(_permit) => TickOutcome::Completed(self.run_cycle().await),
            None => {
                debug!("Previous cycle still running, tick dropped");
                TickOutcome::Skipped
            }
        }
    }

    /// 等待在途周期结束
    pub async fn wait_idle(&self) {
        let mut rx = self.busy.subscribe();
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    async fn current_position(&self) -> Result<Position, SkipReason> {
        match self.mode {
            PositionMode::OneShot => self.location.fetch_once().await.map_err(|e| {
                match &e {
                    LocationError::Timeout(_) => warn!(error = %e, "Position fetch timed out, skipping cycle"),
                    LocationError::PermissionDenied => {
                        warn!(error = %e, "Location permission denied, skipping cycle")
                    }
                    _ => warn!(error = %e, "Position fetch failed, skipping cycle"),
                }
                SkipReason::Location(e)
            }),
            PositionMode::LatestFromStream => {
                if self.location.watch_state() == WatchState::Failed {
                    warn!("Location watch session failed, skipping cycle");
                    return Err(SkipReason::WatchFailed);
                }
                self.location.latest_position().ok_or_else(|| {
                    debug!("No position fix yet, skipping cycle");
                    SkipReason::NoFix
                })
            }
        }
    }

    /// 一个完整的评估周期；调用方必须持有 `CyclePermit`
    async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let position = match self.current_position().await {
            Ok(position) => position,
            Err(reason) => {
                report.skipped = Some(reason);
                return report;
            }
        };

        // 每个周期重新读取任务快照，不缓存围栏
        let tasks = match self.tasks.active_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "Failed to load active tasks, skipping cycle");
                report.skipped = Some(SkipReason::TaskSource(e.to_string()));
                return report;
            }
        };

        let mut geofences = Vec::with_capacity(tasks.len());
        let mut by_id = HashMap::with_capacity(tasks.len());
        for task in tasks {
            match task.geofence() {
                Some(fence) if fence.is_valid() => {
                    geofences.push(fence);
                    by_id.insert(task.id.clone(), task);
                }
                Some(fence) => {
                    warn!(task_id = %task.id, radius = fence.radius_meters, "Ignoring geofence with non-positive radius");
                }
                None => {}
            }
        }

        let active: HashSet<String> = by_id.keys().cloned().collect();
        let dropped = self.dispatcher.retain_tasks(&active);
        if dropped > 0 {
            debug!(dropped, "Dropped notification records of inactive tasks");
        }

        let results = evaluate(&position, &geofences);
        report.evaluated = results.len();
        report.inside = results.iter().filter(|r| r.inside).count();

        let now = Utc::now();
        let decisions = self
            .dispatcher
            .with_history(|history| self.policy.select(&results, history, now));
        let cooling = report.inside - decisions.len();
        if cooling > 0 {
            debug!(cooling, "Tasks inside but still in cooldown");
        }

        // 按距离顺序逐个投递；单个失败不影响后续任务
        for decision in decisions {
            let Some(task) = by_id.get(&decision.task_id) else {
                continue;
            };
            match self.dispatcher.dispatch_at(task, &decision.result, now).await {
                Ok(()) => report.notified.push(decision.task_id),
                Err(e) => {
                    warn!(task_id = %decision.task_id, error = %e, "Notification dispatch failed, will retry next eligible cycle");
                    report.failed.push(decision.task_id);
                }
            }
        }

        debug!(
            evaluated = report.evaluated,
            inside = report.inside,
            notified = report.notified.len(),
            failed = report.failed.len(),
            "Evaluation cycle finished"
        );
        report.position = Some(position);
        report
    }
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 定时器槽位；`Stopping` 期间仍视为 Running，start 被拒绝
enum LoopSlot {
    Running(RunningLoop),
    Stopping,
}

/// stop 结束（或被取消）时清空槽位
struct ClearSlot<'a>(&'a Mutex<Option<LoopSlot>>);

impl Drop for ClearSlot<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// 轮询调度器：Stopped → Running → Stopped
pub struct PollScheduler {
    runner: Arc<CycleRunner>,
    slot: Mutex<Option<LoopSlot>>,
}

impl PollScheduler {
    pub fn new(runner: CycleRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            slot: Mutex::new(None),
        }
    }

    fn slot_guard(&self) -> MutexGuard<'_, Option<LoopSlot>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn runner(&self) -> &Arc<CycleRunner> {
        &self.runner
    }

    /// 停止过程中（等待在途周期）仍然是 Running
    pub fn state(&self) -> SchedulerState {
        match self.slot_guard().as_ref() {
            Some(_) => SchedulerState::Running,
            None => SchedulerState::Stopped,
        }
    }

    /// 启动定时器，第一个周期在一个间隔之后执行
    ///
    /// 已在运行或正在停止时返回 false。
    pub fn start(&self, interval: Duration) -> bool {
        let mut slot = self.slot_guard();
        match slot.as_ref() {
            Some(LoopSlot::Running(_)) => {
                debug!("Scheduler already running");
                return false;
            }
            Some(LoopSlot::Stopping) => {
                debug!("Scheduler is stopping, start refused");
                return false;
            }
            None => {}
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(self.runner.clone(), interval, cancel.clone()));
        *slot = Some(LoopSlot::Running(RunningLoop { cancel, handle }));

        info!(interval_secs = interval.as_secs_f64(), "Poll scheduler started");
        true
    }

    /// 停止定时器；在途周期自然结束后才进入 Stopped 并返回
    pub async fn stop(&self) {
        let running = {
            let mut slot = self.slot_guard();
            match slot.take() {
                Some(LoopSlot::Running(running)) => {
                    *slot = Some(LoopSlot::Stopping);
                    Some(running)
                }
                other => {
                    *slot = other;
                    None
                }
            }
        };

        let Some(running) = running else {
            // 另一个 stop 正在进行，或本来就已停止
            self.runner.wait_idle().await;
            return;
        };

        running.cancel.cancel();
        let _clear = ClearSlot(&self.slot);
        let _ = running.handle.await;
        self.runner.wait_idle().await;

        info!("Poll scheduler stopped");
    }

    /// 手动触发一次受保护的周期
    pub async fn tick(&self) -> TickOutcome {
        self.runner.tick().await
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(LoopSlot::Running(running)) = self.slot_guard().as_ref() {
            running.cancel.cancel();
        }
    }
}

async fn run_loop(runner: Arc<CycleRunner>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                // 在 spawn 之前占用标记，stop 之后不会再有新周期开始
                match runner.try_begin() {
                    Some(permit) => {
                        let runner = runner.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            runner.run_cycle().await;
                        });
                    }
                    None => debug!("Previous cycle still running, tick dropped"),
                }
            }
        }
    }
}
