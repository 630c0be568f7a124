//! 端到端：任务文件 + 模拟定位 + 本地通知日志

use geotask_monitor::notification::LocalFileChannel;
use geotask_monitor::{
    Engine, EngineConfig, NotificationDispatcher, NotificationLog, SimulatedPlatform, Task,
    TaskStore, TickOutcome,
};
use std::sync::Arc;

#[tokio::test]
async fn test_check_cycle_writes_notification_log() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::with_data_dir(dir.path());
    let log_path = dir.path().join("notifications.jsonl");

    // 人民广场附近两个任务，外滩一个
    let pharmacy = store
        .add(Task::new("Pick up prescription", 31.2310, 121.4740, 200.0).with_description("Counter 3"))
        .unwrap();
    let bookshop = store.add(Task::new("Return book", 31.2330, 121.4737, 500.0)).unwrap();
    store.add(Task::new("Bund photo", 31.2400, 121.4900, 200.0)).unwrap();
    let done = store.add(Task::new("Already done", 31.2304, 121.4737, 1000.0)).unwrap();
    store.set_completed(&done, true).unwrap();

    let dispatcher = NotificationDispatcher::new()
        .with_channel(Arc::new(LocalFileChannel::new(NotificationLog::new(&log_path))));
    let engine = Engine::new(
        EngineConfig::default(),
        Arc::new(SimulatedPlatform::fixed(31.2304, 121.4737)),
        Arc::new(store),
        dispatcher,
    );

    let report = match engine.check_now().await {
        TickOutcome::Completed(report) => report,
        TickOutcome::Skipped => panic!("cycle unexpectedly skipped"),
    };
    assert_eq!(report.evaluated, 3);
    assert_eq!(report.notified, vec![pharmacy.clone(), bookshop.clone()]);

    let logged = NotificationLog::new(&log_path).read_recent(10);
    assert_eq!(logged.len(), 2);
    assert_eq!(logged[0].title, "Task Nearby: Pick up prescription");
    assert_eq!(logged[0].body, "Counter 3");
    assert_eq!(logged[1].body, "You are near a location with a pending task");
    assert_eq!(logged[1].task_id.as_deref(), Some(bookshop.as_str()));

    // 同一位置再次检查，冷却期内不会重复写入
    engine.check_now().await;
    assert_eq!(NotificationLog::new(&log_path).read_recent(10).len(), 2);
}

#[tokio::test]
async fn test_dry_run_does_not_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::with_data_dir(dir.path());
    let log_path = dir.path().join("notifications.jsonl");
    let id = store.add(Task::new("Buy milk", 0.0, 0.0, 200.0)).unwrap();

    let dispatcher = NotificationDispatcher::new()
        .with_dry_run(true)
        .with_channel(Arc::new(LocalFileChannel::new(NotificationLog::new(&log_path))));
    let engine = Engine::new(
        EngineConfig::default(),
        Arc::new(SimulatedPlatform::fixed(0.0, 0.0)),
        Arc::new(store),
        dispatcher,
    );

    engine.check_now().await;
    engine.check_now().await;
    assert!(NotificationLog::new(&log_path).read_recent(10).is_empty());
    assert!(engine.dispatcher().last_record(&id).is_none());
}
