//! 通知层 - 去重策略、分发与投递渠道
//!
//! # 数据流
//! 1. `NotificationPolicy` 根据围栏判定结果与通知历史选出要通知的任务（纯函数）
//! 2. `NotificationDispatcher` 渲染并投递通知，投递成功后写入历史
//! 3. 渠道实现 `NotificationChannel`：本地 JSONL 日志、HTTP Webhook
//!
//! # 使用示例
//! ```ignore
//! use geotask_monitor::notification::{LocalFileChannel, NotificationDispatcher};
//!
//! let dispatcher = NotificationDispatcher::new()
//!     .with_channel(Arc::new(LocalFileChannel::default()));
//! dispatcher.send_general("GeoTask", "Monitoring started").await?;
//! ```

pub mod channel;
pub mod channels;
pub mod dispatcher;
pub mod history;
pub mod policy;
pub mod store;

pub use channel::{LocalNotification, NotificationChannel, NotificationError, DEFAULT_TASK_BODY};
pub use channels::{LocalFileChannel, WebhookChannel, WebhookConfig};
pub use dispatcher::NotificationDispatcher;
pub use history::{NotificationHistory, NotificationRecord};
pub use policy::{NotificationDecision, NotificationPolicy, DEFAULT_COOLDOWN};
pub use store::{LoggedNotification, NotificationLog};
