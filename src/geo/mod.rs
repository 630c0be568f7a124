//! 地理计算层 - 位置、地理围栏与距离判定

pub mod distance;
pub mod evaluator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use distance::{distance_meters, EARTH_RADIUS_METERS};
pub use evaluator::{evaluate, within_distance};

/// 一次定位采样（不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// 定位精度（米），平台未提供时为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
    pub sampled_at: DateTime<Utc>,
}

impl Position {
    /// 以当前时间创建采样
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters: None,
            sampled_at: Utc::now(),
        }
    }

    pub fn with_accuracy(mut self, accuracy_meters: f64) -> Self {
        self.accuracy_meters = Some(accuracy_meters);
        self
    }

    pub fn with_sampled_at(mut self, sampled_at: DateTime<Utc>) -> Self {
        self.sampled_at = sampled_at;
        self
    }
}

/// 任务地理围栏（由任务记录派生的只读投影）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceSpec {
    pub task_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 触发半径（米），必须 > 0
    pub radius_meters: f64,
}

impl GeofenceSpec {
    pub fn new(task_id: impl Into<String>, latitude: f64, longitude: f64, radius_meters: f64) -> Self {
        Self {
            task_id: task_id.into(),
            latitude,
            longitude,
            radius_meters,
        }
    }

    /// 半径是否合法（正有限数）
    pub fn is_valid(&self) -> bool {
        self.radius_meters.is_finite() && self.radius_meters > 0.0
    }
}

/// 单个围栏的判定结果，每个评估周期重新生成
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProximityResult {
    pub task_id: String,
    pub distance_meters: f64,
    pub inside: bool,
}
