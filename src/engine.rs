//! 监控引擎 - 显式构造的实例，持有定位、任务来源、分发器与调度器
//!
//! 每个 `Engine` 独立拥有自己的依赖，可以同时存在多个实例，
//! `stop()` 之后不会残留定时器或平台监听句柄。

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::location::{LocationError, LocationProvider, PositionPlatform, WatchSession};
use crate::notification::{NotificationDispatcher, NotificationPolicy};
use crate::scheduler::{CycleRunner, PollScheduler, PositionMode, SchedulerState, TickOutcome};
use crate::task::TaskSource;

/// 外部任务变更事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Created(String),
    Updated(String),
    Completed(String),
    Deleted(String),
}

/// 监控引擎
pub struct Engine {
    config: EngineConfig,
    location: Arc<LocationProvider>,
    dispatcher: Arc<NotificationDispatcher>,
    scheduler: PollScheduler,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        platform: Arc<dyn PositionPlatform>,
        tasks: Arc<dyn TaskSource>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        let location = Arc::new(
            LocationProvider::new(platform)
                .with_fetch_timeout(config.fetch_timeout())
                .with_high_accuracy(config.high_accuracy),
        );
        let dispatcher = Arc::new(dispatcher);
        let runner = CycleRunner::new(
            location.clone(),
            tasks,
            dispatcher.clone(),
            NotificationPolicy::new(config.cooldown()),
            config.position_mode,
        );

        Self {
            config,
            location,
            dispatcher,
            scheduler: PollScheduler::new(runner),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn location(&self) -> &Arc<LocationProvider> {
        &self.location
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// 启动监控
    ///
    /// 设备没有定位能力时返回 `Unavailable`，调度器不会启动。
    /// 通知权限被拒绝只记录警告。
    pub async fn start(&self) -> Result<(), LocationError> {
        if self.scheduler.state() == SchedulerState::Running {
            return Ok(());
        }
        if !self.location.is_available() {
            warn!(platform = self.location.platform_name(), "Geolocation is not available, monitoring not started");
            return Err(LocationError::Unavailable);
        }

        self.dispatcher.request_permissions().await;

        if self.config.position_mode == PositionMode::LatestFromStream {
            if let Err(e) = self.location.start_watching().await {
                // 周期会跳过直到重新 start_watching 成功
                warn!(error = %e, "Failed to start location watch");
            }
        }

        self.scheduler.start(self.config.poll_interval());
        info!(
            platform = self.location.platform_name(),
            mode = ?self.config.position_mode,
            cooldown_secs = self.config.cooldown_secs,
            "Geofence monitoring started"
        );
        Ok(())
    }

    /// 停止监控：停止定时器（等待在途周期）并拆除监听会话
    pub async fn stop(&self) {
        self.scheduler.stop().await;
        self.location.stop_watching().await;
        info!("Geofence monitoring stopped");
    }

    /// 重新建立持续监听（会话 Failed 后由调用方决定是否重启）
    pub async fn restart_watching(&self) -> Result<WatchSession, LocationError> {
        self.location.start_watching().await
    }

    /// 立即执行一次受保护的周期
    pub async fn check_now(&self) -> TickOutcome {
        self.scheduler.tick().await
    }

    /// 任务完成或删除时清除其通知记录
    pub fn handle_task_event(&self, event: TaskEvent) {
        match event {
            TaskEvent::Completed(task_id) | TaskEvent::Deleted(task_id) => {
                self.dispatcher.forget(&task_id);
            }
            // 下一个周期会读取新的任务快照
            TaskEvent::Created(_) | TaskEvent::Updated(_) => {}
        }
    }
}
