//! Atomic publication of snapshots and the stale-while-rebuild read policy.
//!
//! A single `SnapshotPublisher` owns the current snapshot. Readers call
//! [`SnapshotPublisher::current`] and always receive a complete snapshot:
//!
//! - no snapshot yet: the caller waits for the first rebuild;
//! - snapshot older than the refresh interval: a background rebuild starts
//!   and the stale snapshot is returned immediately;
//! - at most one rebuild runs at any time.
//!
//! A rebuild that fails (bad source list, shutdown, storage error) never
//! touches the snapshot currently served.

use crate::core::etl::EtlEngine;
use crate::core::{Pipeline, Snapshot, Storage};
use crate::utils::error::{EtlError, Result};
use crate::utils::shutdown::ShutdownToken;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

pub const CACHE_FILE: &str = "cache.json";
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);

struct Inner<P: Pipeline, S: Storage> {
    engine: EtlEngine<P>,
    storage: S,
    refresh_interval: Duration,
    shutdown: ShutdownToken,
    current: watch::Sender<Option<Arc<Snapshot>>>,
    /// 已結束的重建次數（不論成功或失敗）
    attempts: watch::Sender<u64>,
    rebuilding: AtomicBool,
    publish_count: AtomicU64,
    /// 寫檔與替換記憶體快照必須一起完成，磁碟與記憶體才會一致
    publish_lock: tokio::sync::Mutex<()>,
    last_error: Mutex<Option<String>>,
}

/// Holds the single rebuild slot; releases it on drop.
struct RebuildGuard<P: Pipeline, S: Storage> {
    inner: Arc<Inner<P, S>>,
}

impl<P: Pipeline, S: Storage> RebuildGuard<P, S> {
    fn acquire(inner: &Arc<Inner<P, S>>) -> Option<Self> {
        inner
            .rebuilding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                inner: inner.clone(),
            })
    }
}

impl<P: Pipeline, S: Storage> Drop for RebuildGuard<P, S> {
    fn drop(&mut self) {
        self.inner.rebuilding.store(false, Ordering::Release);
    }
}

impl<P: Pipeline, S: Storage> Inner<P, S> {
    fn peek(&self) -> Option<Arc<Snapshot>> {
        self.current.borrow().clone()
    }

    async fn rebuild(&self) -> Result<Arc<Snapshot>> {
        let snapshot = self.engine.run(&self.shutdown).await?;
        self.publish(snapshot).await
    }

    async fn publish(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>> {
        let data = serde_json::to_vec(&snapshot)?;
        let snapshot = Arc::new(snapshot);

        {
            let _writer = self.publish_lock.lock().await;
            self.storage.write_file(CACHE_FILE, &data).await?;
            self.current.send_replace(Some(snapshot.clone()));
            self.publish_count.fetch_add(1, Ordering::Relaxed);
        }

        tracing::info!(
            updated_at = %snapshot.updated_at,
            scams = snapshot.scams.len(),
            "rebuild complete"
        );
        Ok(snapshot)
    }

    /// Runs a rebuild while holding the slot, then reports the attempt.
    async fn rebuild_with(&self, guard: RebuildGuard<P, S>) -> Result<Arc<Snapshot>> {
        let result = self.rebuild().await;

        match &result {
            Ok(_) => {
                if let Ok(mut last_error) = self.last_error.lock() {
                    *last_error = None;
                }
            }
            Err(e) => {
                tracing::error!(
                    "❌ Rebuild failed, keeping the previous snapshot: {} (Category: {:?}, Severity: {:?})",
                    e,
                    e.category(),
                    e.severity()
                );
                if let Ok(mut last_error) = self.last_error.lock() {
                    *last_error = Some(e.to_string());
                }
            }
        }

        // 先釋放重建位置，再通知等待者
        drop(guard);
        self.attempts.send_modify(|n| *n += 1);
        result
    }
}

pub struct SnapshotPublisher<P: Pipeline, S: Storage> {
    inner: Arc<Inner<P, S>>,
}

impl<P: Pipeline, S: Storage> Clone for SnapshotPublisher<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P, S> SnapshotPublisher<P, S>
where
    P: Pipeline + 'static,
    S: Storage + 'static,
{
    pub fn new(engine: EtlEngine<P>, storage: S, refresh_interval: Duration) -> Self {
        Self::with_shutdown(engine, storage, refresh_interval, ShutdownToken::new())
    }

    pub fn with_shutdown(
        engine: EtlEngine<P>,
        storage: S,
        refresh_interval: Duration,
        shutdown: ShutdownToken,
    ) -> Self {
        let (current, _) = watch::channel(None);
        let (attempts, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                engine,
                storage,
                refresh_interval,
                shutdown,
                current,
                attempts,
                rebuilding: AtomicBool::new(false),
                publish_count: AtomicU64::new(0),
                publish_lock: tokio::sync::Mutex::new(()),
                last_error: Mutex::new(None),
            }),
        }
    }

    pub fn shutdown_token(&self) -> &ShutdownToken {
        &self.inner.shutdown
    }

    pub fn engine(&self) -> &EtlEngine<P> {
        &self.inner.engine
    }

    pub fn is_rebuilding(&self) -> bool {
        self.inner.rebuilding.load(Ordering::Acquire)
    }

    /// Number of snapshots published by this publisher.
    pub fn publish_count(&self) -> u64 {
        self.inner.publish_count.load(Ordering::Relaxed)
    }

    /// Notified every time a new snapshot is swapped in.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.inner.current.subscribe()
    }

    /// The current snapshot without any refresh policy applied.
    pub fn peek(&self) -> Option<Arc<Snapshot>> {
        self.inner.peek()
    }

    /// Persists `snapshot` and makes it the one served to readers.
    pub async fn publish(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>> {
        self.inner.publish(snapshot).await
    }

    /// Returns the snapshot to serve.
    ///
    /// Blocks only when nothing has been published yet; a stale snapshot is
    /// returned right away while a rebuild runs in the background.
    pub async fn current(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.peek() {
            if snapshot.is_stale(self.inner.refresh_interval) && self.spawn_rebuild() {
                tracing::info!(
                    "♻️ Snapshot is {}s old, rebuilding in the background",
                    snapshot.age().num_seconds()
                );
            }
            return Ok(snapshot);
        }

        // 訂閱要在檢查之前，避免錯過剛結束的重建
        let mut attempts = self.inner.attempts.subscribe();
        if let Some(snapshot) = self.peek() {
            return Ok(snapshot);
        }

        tracing::info!("No snapshot found. Creating one...");
        self.spawn_rebuild();
        attempts
            .changed()
            .await
            .map_err(|_| EtlError::ProcessingError {
                message: "publisher stopped before the first rebuild finished".to_string(),
            })?;

        match self.peek() {
            Some(snapshot) => Ok(snapshot),
            None => {
                let reason = self
                    .inner
                    .last_error
                    .lock()
                    .ok()
                    .and_then(|e| e.clone())
                    .unwrap_or_else(|| "unknown error".to_string());
                Err(EtlError::ProcessingError {
                    message: format!("initial rebuild failed: {}", reason),
                })
            }
        }
    }

    /// Starts a background rebuild unless one is already running.
    pub fn force_refresh(&self) -> bool {
        self.spawn_rebuild()
    }

    /// Runs a rebuild in the calling task and returns the published snapshot.
    pub async fn rebuild_now(&self) -> Result<Arc<Snapshot>> {
        let guard = RebuildGuard::acquire(&self.inner).ok_or_else(|| EtlError::ProcessingError {
            message: "a rebuild is already in progress".to_string(),
        })?;
        self.inner.rebuild_with(guard).await
    }

    /// Loads the last published snapshot from storage, if there is one.
    ///
    /// A corrupt cache file is ignored so the next rebuild can replace it.
    pub async fn restore(&self) -> Result<Option<Arc<Snapshot>>> {
        let _writer = self.inner.publish_lock.lock().await;
        if !self.inner.storage.exists(CACHE_FILE).await {
            return Ok(None);
        }

        let data = self.inner.storage.read_file(CACHE_FILE).await?;
        match serde_json::from_slice::<Snapshot>(&data) {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                tracing::info!(
                    "📂 Restored snapshot from {} ({} entries)",
                    snapshot.updated_at,
                    snapshot.scams.len()
                );
                self.inner.current.send_replace(Some(snapshot.clone()));
                Ok(Some(snapshot))
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable {}: {}", CACHE_FILE, e);
                Ok(None)
            }
        }
    }

    fn spawn_rebuild(&self) -> bool {
        let Some(guard) = RebuildGuard::acquire(&self.inner) else {
            tracing::debug!("Rebuild already in progress");
            return false;
        };

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _ = inner.rebuild_with(guard).await;
        });
        true
    }
}
