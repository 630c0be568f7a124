//! 定位层 - 平台定位能力抽象与持续监听会话
//!
//! # 组成
//! - `PositionPlatform`: 平台边界（单次定位、持续监听、取消监听）
//! - `LocationProvider`: 单次定位（带超时）与唯一的 `WatchSession` 管理
//! - `simulated`: 固定坐标 / JSONL 轨迹回放平台（桌面与测试环境使用）

pub mod provider;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::geo::Position;

pub use provider::{LocationProvider, LocationSubscription};
pub use simulated::SimulatedPlatform;

/// 单次定位的默认超时
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// 定位错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    /// 设备没有定位能力
    #[error("geolocation is not available on this device")]
    Unavailable,
    /// 用户拒绝了定位权限
    #[error("location permission denied")]
    PermissionDenied,
    /// 在限定时间内没有拿到定位
    #[error("no position fix within {0:?}")]
    Timeout(Duration),
    /// 平台在监听过程中报告的其他错误
    #[error("positioning platform error: {0}")]
    Platform(String),
}

impl LocationError {
    /// 是否为暂时性错误（下一个周期会自动重试）
    pub fn is_transient(&self) -> bool {
        matches!(self, LocationError::Timeout(_) | LocationError::Platform(_))
    }
}

/// 持续监听流中的一条消息：新定位或终止错误
pub type LocationUpdate = Result<Position, LocationError>;

/// 平台监听句柄（不透明）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchHandle(pub String);

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 监听会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    Idle,
    Watching,
    Failed,
}

/// 持续监听会话快照
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSession {
    pub id: u64,
    pub state: WatchState,
    pub handle: WatchHandle,
}

/// 持续监听选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    /// 单次定位等待上限
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// 平台定位能力
///
/// 实现方负责把新定位写入 `sink`；写入失败（接收端已关闭）时应停止推送。
#[async_trait]
pub trait PositionPlatform: Send + Sync {
    /// 平台名称（用于日志）
    fn name(&self) -> &str;

    /// 设备是否具备定位能力
    fn is_available(&self) -> bool;

    /// 单次定位
    async fn get_current_position(&self, timeout: Duration) -> Result<Position, LocationError>;

    /// 开始持续监听，返回平台句柄
    async fn watch_position(
        &self,
        options: &WatchOptions,
        sink: mpsc::UnboundedSender<LocationUpdate>,
    ) -> Result<WatchHandle, LocationError>;

    /// 取消监听；未知句柄时无操作
    async fn clear_watch(&self, handle: &WatchHandle);
}
