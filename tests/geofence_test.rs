//! 距离计算、围栏判定与通知策略的组合测试

mod common;

use chrono::{Duration, Utc};
use common::lat_north_of_equator;
use geotask_monitor::{distance_meters, evaluate, GeofenceSpec, NotificationHistory, NotificationPolicy, Position};

#[test]
fn test_one_thousandth_degree_at_equator() {
    let d = distance_meters(0.0, 0.0, 0.0, 0.001);
    assert!((d - 111.19).abs() < 0.1, "got {}", d);
}

#[test]
fn test_distance_symmetric_and_zero() {
    let a = (31.2304, 121.4737);
    let b = (31.2397, 121.4998);
    let ab = distance_meters(a.0, a.1, b.0, b.1);
    let ba = distance_meters(b.0, b.1, a.0, a.1);
    assert!((ab - ba).abs() < 1e-9);
    assert_eq!(distance_meters(a.0, a.1, a.0, a.1), 0.0);
}

fn fences() -> Vec<GeofenceSpec> {
    vec![
        GeofenceSpec::new("far", lat_north_of_equator(400.0), 0.0, 500.0),
        GeofenceSpec::new("near", lat_north_of_equator(50.0), 0.0, 100.0),
        GeofenceSpec::new("outside", lat_north_of_equator(150.0), 0.0, 100.0),
    ]
}

#[test]
fn test_evaluate_then_select_orders_by_distance() {
    let position = Position::new(0.0, 0.0);
    let results = evaluate(&position, &fences());

    let inside: Vec<bool> = results.iter().map(|r| r.inside).collect();
    assert_eq!(inside, vec![true, true, false]);
    assert!((results[0].distance_meters - 400.0).abs() < 0.01);
    assert!((results[1].distance_meters - 50.0).abs() < 0.01);
    assert!((results[2].distance_meters - 150.0).abs() < 0.01);

    let policy = NotificationPolicy::default();
    let selected = policy.select(&results, &NotificationHistory::new(), Utc::now());
    let ids: Vec<&str> = selected.iter().map(|d| d.task_id.as_str()).collect();
    assert_eq!(ids, vec!["near", "far"]);
}

#[test]
fn test_cooldown_window_across_cycles() {
    let position = Position::new(0.0, 0.0);
    let results = evaluate(&position, &fences());
    let policy = NotificationPolicy::default();
    let t0 = Utc::now();

    let mut history = NotificationHistory::new();
    for decision in policy.select(&results, &history, t0) {
        history.record(&decision.task_id, t0);
    }

    // 一分钟后：都在冷却中
    assert!(policy.select(&results, &history, t0 + Duration::seconds(60)).is_empty());

    // 15 分钟后：重新可通知
    let later = policy.select(&results, &history, t0 + Duration::seconds(900));
    assert_eq!(later.len(), 2);
}

#[test]
fn test_zero_cooldown_fires_every_cycle() {
    let position = Position::new(0.0, 0.0);
    let results = evaluate(&position, &fences());
    let policy = NotificationPolicy::new(std::time::Duration::ZERO);
    let now = Utc::now();

    let mut history = NotificationHistory::new();
    history.record("near", now);
    history.record("far", now);

    assert_eq!(policy.select(&results, &history, now).len(), 2);
}

#[test]
fn test_three_tasks_in_listed_order() {
    let fences = vec![
        GeofenceSpec::new("task@50", lat_north_of_equator(50.0), 0.0, 100.0),
        GeofenceSpec::new("task@150", lat_north_of_equator(150.0), 0.0, 100.0),
        GeofenceSpec::new("task@400", lat_north_of_equator(400.0), 0.0, 500.0),
    ];
    let results = evaluate(&Position::new(0.0, 0.0), &fences);
    let inside: Vec<bool> = results.iter().map(|r| r.inside).collect();
    assert_eq!(inside, vec![true, false, true]);

    let selected = NotificationPolicy::default().select(&results, &NotificationHistory::new(), Utc::now());
    let ids: Vec<&str> = selected.iter().map(|d| d.task_id.as_str()).collect();
    assert_eq!(ids, vec!["task@50", "task@400"]);
}
