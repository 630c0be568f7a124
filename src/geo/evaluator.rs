//! 地理围栏判定 - 纯函数，无状态

use super::distance::distance_meters;
use super::{GeofenceSpec, Position, ProximityResult};

/// 对每个围栏计算距离与是否在范围内
///
/// 输出与输入一一对应且保持顺序。边界包含：距离恰好等于半径视为在内。
pub fn evaluate(position: &Position, geofences: &[GeofenceSpec]) -> Vec<ProximityResult> {
    geofences
        .iter()
        .map(|fence| {
            let distance = distance_meters(
                position.latitude,
                position.longitude,
                fence.latitude,
                fence.longitude,
            );
            ProximityResult {
                task_id: fence.task_id.clone(),
                distance_meters: distance,
                inside: distance <= fence.radius_meters,
            }
        })
        .collect()
}

/// 判断某个坐标是否在给定点的 `max_distance` 米以内
pub fn within_distance(
    latitude: f64,
    longitude: f64,
    target_latitude: f64,
    target_longitude: f64,
    max_distance: f64,
) -> Option<f64> {
    let distance = distance_meters(latitude, longitude, target_latitude, target_longitude);
    (distance <= max_distance).then_some(distance)
}
