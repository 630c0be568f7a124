//! 引擎配置 - `~/.config/geotask/config.json`
//!
//! 所有字段都有默认值，配置文件不存在时使用默认配置。

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::notification::WebhookConfig;
use crate::scheduler::PositionMode;
use crate::task::{normalize_radius, DEFAULT_RADIUS_METERS};

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 轮询间隔（秒）
    pub poll_interval_secs: u64,
    /// 同一任务两次通知的最小间隔（秒），0 表示每个周期都通知
    pub cooldown_secs: u64,
    /// 新任务的默认半径（米）
    pub default_radius_meters: f64,
    /// 单次定位超时（秒）
    pub fetch_timeout_secs: u64,
    /// 每个周期的定位来源
    pub position_mode: PositionMode,
    pub high_accuracy: bool,
    /// 附近任务查询的默认距离（米）
    pub nearby_max_distance_meters: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            cooldown_secs: 900,
            default_radius_meters: DEFAULT_RADIUS_METERS,
            fetch_timeout_secs: 10,
            position_mode: PositionMode::OneShot,
            high_accuracy: true,
            nearby_max_distance_meters: 500.0,
            webhook: None,
        }
    }
}

impl EngineConfig {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config/geotask/config.json")
    }

    /// 从默认路径加载
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// 从指定路径加载；文件不存在时返回默认配置
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("配置文件格式错误: {}", path.display()))?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs 必须大于 0"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(anyhow!("fetch_timeout_secs 必须大于 0"));
        }
        if !(self.nearby_max_distance_meters.is_finite() && self.nearby_max_distance_meters > 0.0) {
            return Err(anyhow!("nearby_max_distance_meters 必须大于 0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// 对齐到选择器刻度后的默认半径
    pub fn default_radius(&self) -> f64 {
        normalize_radius(self.default_radius_meters)
    }
}
