//! Haversine 大圆距离

/// 地球半径（米），按球体计算
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// 计算两点之间的大圆距离（米）
///
/// 输入为角度制经纬度。`a` 项先夹到 `[0, 1]`，
/// 对跖点或浮点误差导致的越界不会产生 NaN。
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let half_lat = (d_lat / 2.0).sin();
    let half_lon = (d_lon / 2.0).sin();
    let a = half_lat * half_lat + phi1.cos() * phi2.cos() * half_lon * half_lon;
    let a = a.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}
