//! 定位提供者 - 单次定位与唯一持续监听会话

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    LocationError, LocationUpdate, PositionPlatform, WatchHandle, WatchOptions, WatchSession,
    WatchState, DEFAULT_FETCH_TIMEOUT,
};
use crate::geo::Position;

/// 每个订阅者可缓冲的定位条数，超出后最旧的被丢弃
const UPDATE_BUFFER: usize = 32;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 会话内与转发任务共享的状态
struct SessionShared {
    state: Mutex<WatchState>,
    /// 发送端只在这里持有一份，取走即关闭通道
    updates: Mutex<Option<broadcast::Sender<LocationUpdate>>>,
}

impl SessionShared {
    fn new(updates: broadcast::Sender<LocationUpdate>) -> Self {
        Self {
            state: Mutex::new(WatchState::Watching),
            updates: Mutex::new(Some(updates)),
        }
    }

    fn state(&self) -> WatchState {
        *lock(&self.state)
    }

    fn set_state(&self, state: WatchState) {
        *lock(&self.state) = state;
    }

    fn publish(&self, position: Position) {
        if let Some(tx) = lock(&self.updates).as_ref() {
            // 没有订阅者时发送失败，忽略
            let _ = tx.send(Ok(position));
        }
    }

    /// 进入 Failed，向所有订阅者推送一次错误后关闭通道
    fn fail(&self, error: LocationError) {
        self.set_state(WatchState::Failed);
        if let Some(tx) = lock(&self.updates).take() {
            let _ = tx.send(Err(error));
        }
    }

    fn close(&self) {
        lock(&self.updates).take();
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<LocationUpdate>> {
        lock(&self.updates).as_ref().map(|tx| tx.subscribe())
    }
}

struct ActiveSession {
    id: u64,
    handle: WatchHandle,
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
    forwarder: JoinHandle<()>,
}

/// 定位提供者
///
/// 每个实例最多持有一个活动的监听会话。`start_watching` 会先拆除旧会话，
/// 因此不会出现重复订阅或遗留的平台句柄。
pub struct LocationProvider {
    platform: Arc<dyn PositionPlatform>,
    options: WatchOptions,
    fetch_timeout: Duration,
    /// 串行化 start/stop
    lifecycle: tokio::sync::Mutex<()>,
    current: Mutex<Option<ActiveSession>>,
    latest: Arc<watch::Sender<Option<Position>>>,
    next_session_id: AtomicU64,
}

impl LocationProvider {
    pub fn new(platform: Arc<dyn PositionPlatform>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            platform,
            options: WatchOptions::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            lifecycle: tokio::sync::Mutex::new(()),
            current: Mutex::new(None),
            latest: Arc::new(latest),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// 设置单次定位超时（同时作为监听选项的超时）
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self.options.timeout = timeout;
        self
    }

    pub fn with_high_accuracy(mut self, enabled: bool) -> Self {
        self.options.enable_high_accuracy = enabled;
        self
    }

    pub fn platform_name(&self) -> &str {
        self.platform.name()
    }

    pub fn is_available(&self) -> bool {
        self.platform.is_available()
    }

    /// 单次定位，不做内部重试
    pub async fn fetch_once(&self) -> Result<Position, LocationError> {
        if !self.platform.is_available() {
            return Err(LocationError::Unavailable);
        }

        let fetch = self.platform.get_current_position(self.fetch_timeout);
        match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(position)) => {
                self.latest.send_replace(Some(position.clone()));
                Ok(position)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LocationError::Timeout(self.fetch_timeout)),
        }
    }

    /// 最近一次已知定位（非阻塞快照）
    pub fn latest_position(&self) -> Option<Position> {
        self.latest.borrow().clone()
    }

    /// 最近定位的变更通知（供界面层预填新任务位置）
    pub fn position_updates(&self) -> watch::Receiver<Option<Position>> {
        self.latest.subscribe()
    }

    /// 开始持续监听；已有会话时先拆除旧会话
    pub async fn start_watching(&self) -> Result<WatchSession, LocationError> {
        let _guard = self.lifecycle.lock().await;

        if let Some(old) = self.teardown().await {
            debug!(session_id = old, "Replaced previous watch session");
        }

        if !self.platform.is_available() {
            return Err(LocationError::Unavailable);
        }

        let (sink, rx) = mpsc::unbounded_channel();
        let handle = self.platform.watch_position(&self.options, sink).await?;

        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        let shared = Arc::new(SessionShared::new(updates));
        let cancel = CancellationToken::new();
        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);

        let forwarder = tokio::spawn(forward_updates(
            id,
            rx,
            shared.clone(),
            self.latest.clone(),
            cancel.clone(),
        ));

        info!(
            session_id = id,
            platform = self.platform.name(),
            handle = %handle,
            "Location watch started"
        );

        *lock(&self.current) = Some(ActiveSession {
            id,
            handle: handle.clone(),
            shared,
            cancel,
            forwarder,
        });

        Ok(WatchSession {
            id,
            state: WatchState::Watching,
            handle,
        })
    }

    /// 停止持续监听；没有会话时无操作
    pub async fn stop_watching(&self) {
        let _guard = self.lifecycle.lock().await;
        if let Some(id) = self.teardown().await {
            info!(session_id = id, "Location watch stopped");
        }
    }

    /// 当前会话快照
    pub fn current_session(&self) -> Option<WatchSession> {
        lock(&self.current).as_ref().map(|s| WatchSession {
            id: s.id,
            state: s.shared.state(),
            handle: s.handle.clone(),
        })
    }

    pub fn watch_state(&self) -> WatchState {
        lock(&self.current)
            .as_ref()
            .map(|s| s.shared.state())
            .unwrap_or(WatchState::Idle)
    }

    /// 订阅当前会话的定位流；无会话或流已关闭时返回 None
    pub fn subscribe(&self) -> Option<LocationSubscription> {
        lock(&self.current)
            .as_ref()
            .and_then(|s| s.shared.subscribe())
            .map(LocationSubscription::new)
    }

    /// 拆除当前会话，返回被拆除的会话 ID
    async fn teardown(&self) -> Option<u64> {
        let session = lock(&self.current).take()?;

        session.cancel.cancel();
        let _ = session.forwarder.await;
        session.shared.close();
        self.platform.clear_watch(&session.handle).await;

        Some(session.id)
    }
}

impl Drop for LocationProvider {
    fn drop(&mut self) {
        if let Some(session) = lock(&self.current).as_ref() {
            session.cancel.cancel();
        }
    }
}

/// 把平台推送的定位转发给订阅者，并维护最近定位
async fn forward_updates(
    session_id: u64,
    mut rx: mpsc::UnboundedReceiver<LocationUpdate>,
    shared: Arc<SessionShared>,
    latest: Arc<watch::Sender<Option<Position>>>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => next,
        };

        match next {
            Some(Ok(position)) => {
                latest.send_replace(Some(position.clone()));
                shared.publish(position);
            }
            Some(Err(error)) => {
                warn!(session_id, error = %error, "Watch position error");
                shared.fail(error);
                return;
            }
            None => {
                debug!(session_id, "Platform closed the watch stream");
                shared.set_state(WatchState::Idle);
                break;
            }
        }
    }
    shared.close();
}

/// 定位流订阅者，读到通道关闭为止
pub struct LocationSubscription {
    rx: broadcast::Receiver<LocationUpdate>,
}

impl LocationSubscription {
    fn new(rx: broadcast::Receiver<LocationUpdate>) -> Self {
        Self { rx }
    }

    /// 下一条消息；通道关闭后返回 None
    pub async fn next(&mut self) -> Option<LocationUpdate> {
        loop {
            match self.rx.recv().await {
                Ok(update) => return Some(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Location subscriber lagged, dropping old fixes");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
