//! 监控引擎生命周期

mod common;

use common::{task_at, RecordingChannel, ScriptedPlatform};
use geotask_monitor::{
    Engine, EngineConfig, LocationError, MemoryTaskSource, NotificationDispatcher, PositionMode,
    SchedulerState, TaskEvent, TickOutcome, WatchState,
};
use std::sync::Arc;

fn engine_with(
    config: EngineConfig,
    platform: Arc<ScriptedPlatform>,
    channel: Arc<RecordingChannel>,
) -> (Engine, Arc<MemoryTaskSource>) {
    let tasks = Arc::new(MemoryTaskSource::new(vec![
        task_at("near", 50.0, 100.0),
        task_at("outside", 150.0, 100.0),
    ]));
    let dispatcher = NotificationDispatcher::new().with_channel(channel);
    let engine = Engine::new(config, platform, tasks.clone(), dispatcher);
    (engine, tasks)
}

#[tokio::test]
async fn test_start_refused_without_geolocation() {
    let platform = Arc::new(ScriptedPlatform::unavailable());
    let (engine, _) = engine_with(EngineConfig::default(), platform.clone(), Arc::new(RecordingChannel::new()));

    assert_eq!(engine.start().await, Err(LocationError::Unavailable));
    assert_eq!(engine.state(), SchedulerState::Stopped);
    assert_eq!(platform.watch_calls(), 0);
}

#[tokio::test]
async fn test_start_and_stop_in_stream_mode() {
    let platform = Arc::new(ScriptedPlatform::new());
    let config = EngineConfig {
        position_mode: PositionMode::LatestFromStream,
        ..Default::default()
    };
    let (engine, _) = engine_with(config, platform.clone(), Arc::new(RecordingChannel::new()));

    engine.start().await.unwrap();
    assert_eq!(engine.state(), SchedulerState::Running);
    assert_eq!(engine.location().watch_state(), WatchState::Watching);

    // 重复 start 不会注册第二个监听
    engine.start().await.unwrap();
    assert_eq!(platform.watch_calls(), 1);

    engine.stop().await;
    assert_eq!(engine.state(), SchedulerState::Stopped);
    assert_eq!(platform.active_watches(), 0);
    assert_eq!(engine.location().watch_state(), WatchState::Idle);
}

#[tokio::test]
async fn test_permission_refusal_does_not_block_start() {
    let platform = Arc::new(ScriptedPlatform::new());
    let channel = Arc::new(RecordingChannel::denying_permission());
    let (engine, _) = engine_with(EngineConfig::default(), platform, channel);

    engine.start().await.unwrap();
    assert_eq!(engine.state(), SchedulerState::Running);
    engine.stop().await;
}

#[tokio::test]
async fn test_check_now_respects_cooldown() {
    let platform = Arc::new(ScriptedPlatform::new());
    let channel = Arc::new(RecordingChannel::new());
    let (engine, _) = engine_with(EngineConfig::default(), platform, channel.clone());

    assert!(matches!(engine.check_now().await, TickOutcome::Completed(_)));
    assert!(matches!(engine.check_now().await, TickOutcome::Completed(_)));
    assert_eq!(channel.sent_task_ids(), vec!["near"]);
}

#[tokio::test]
async fn test_zero_cooldown_notifies_every_cycle() {
    let platform = Arc::new(ScriptedPlatform::new());
    let channel = Arc::new(RecordingChannel::new());
    let config = EngineConfig {
        cooldown_secs: 0,
        ..Default::default()
    };
    let (engine, _) = engine_with(config, platform, channel.clone());

    for _ in 0..3 {
        engine.check_now().await;
    }
    assert_eq!(channel.sent_task_ids(), vec!["near", "near", "near"]);
}

#[tokio::test]
async fn test_task_events_clear_history() {
    let platform = Arc::new(ScriptedPlatform::new());
    let channel = Arc::new(RecordingChannel::new());
    let (engine, tasks) = engine_with(EngineConfig::default(), platform, channel.clone());

    engine.check_now().await;
    assert!(engine.dispatcher().last_record("near").is_some());

    // 完成后重新打开：记录已清除，立即再次通知
    tasks.set_completed("near", true);
    engine.handle_task_event(TaskEvent::Completed("near".into()));
    assert!(engine.dispatcher().last_record("near").is_none());
    tasks.set_completed("near", false);
    engine.handle_task_event(TaskEvent::Updated("near".into()));

    engine.check_now().await;
    assert_eq!(channel.sent_task_ids(), vec!["near", "near"]);

    tasks.remove("near");
    engine.handle_task_event(TaskEvent::Deleted("near".into()));
    assert!(engine.dispatcher().last_record("near").is_none());

    let report = match engine.check_now().await {
        TickOutcome::Completed(report) => report,
        TickOutcome::Skipped => panic!("cycle unexpectedly skipped"),
    };
    assert_eq!(report.evaluated, 1);
    assert!(report.notified.is_empty());
}

#[tokio::test]
async fn test_independent_engines() {
    let first_channel = Arc::new(RecordingChannel::new());
    let second_channel = Arc::new(RecordingChannel::new());
    let (first, _) = engine_with(EngineConfig::default(), Arc::new(ScriptedPlatform::new()), first_channel.clone());
    let (second, _) = engine_with(EngineConfig::default(), Arc::new(ScriptedPlatform::new()), second_channel.clone());

    first.check_now().await;
    second.check_now().await;
    assert_eq!(first_channel.sent().len(), 1);
    assert_eq!(second_channel.sent().len(), 1);
}
