//! GeoTask Monitor - 带位置的任务提醒：地理围栏监控与靠近通知

pub mod config;
pub mod engine;
pub mod geo;
pub mod location;
pub mod notification;
pub mod scheduler;
pub mod task;

pub use config::EngineConfig;
pub use engine::{Engine, TaskEvent};
pub use geo::{distance_meters, evaluate, GeofenceSpec, Position, ProximityResult};
pub use location::{
    LocationError, LocationProvider, LocationSubscription, LocationUpdate, PositionPlatform,
    SimulatedPlatform, WatchHandle, WatchOptions, WatchSession, WatchState,
};
pub use notification::{
    LocalFileChannel, LocalNotification, NotificationChannel, NotificationDispatcher,
    NotificationError, NotificationHistory, NotificationLog, NotificationPolicy, NotificationRecord,
    WebhookChannel, WebhookConfig,
};
pub use scheduler::{CycleReport, CycleRunner, PollScheduler, PositionMode, SchedulerState, SkipReason, TickOutcome};
pub use task::{MemoryTaskSource, Task, TaskLocation, TaskSource, TaskStore};
