use crate::core::aggregator::Aggregator;
use crate::core::{Probe, ProgressEvent, ScamEntry, Snapshot, VerifiedEntry};
use crate::utils::error::{EtlError, Result};
use crate::utils::shutdown::ShutdownToken;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_CONCURRENCY: usize = 32;
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// 進度計數器，由回報任務讀取
struct Progress {
    total: usize,
    checked: AtomicUsize,
    pending: AtomicUsize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            total,
            checked: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
        }
    }

    fn event(&self) -> ProgressEvent {
        ProgressEvent {
            checked: self.checked.load(Ordering::Relaxed),
            total: self.total,
            pending: self.pending.load(Ordering::Relaxed),
        }
    }
}

/// Counts one probe as in flight until dropped, whether the probe finished
/// or its future was cancelled.
struct InFlight {
    progress: Arc<Progress>,
}

impl InFlight {
    fn enter(progress: Arc<Progress>) -> Self {
        progress.pending.fetch_add(1, Ordering::Relaxed);
        Self { progress }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.progress.pending.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Fans probes out over a bounded pool and folds the results on a single
/// consumer.
///
/// The probe stream ends only after every entry has been dispatched and
/// every dispatched probe has completed, which is the point where the
/// aggregate becomes final.
pub struct Coordinator<P: Probe> {
    prober: P,
    concurrency: usize,
    progress_interval: Duration,
    events: Arc<watch::Sender<ProgressEvent>>,
}

impl<P: Probe> Coordinator<P> {
    pub fn new(prober: P) -> Self {
        let (events, _) = watch::channel(ProgressEvent::default());
        Self {
            prober,
            concurrency: DEFAULT_CONCURRENCY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            events: Arc::new(events),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Latest `{checked, total, pending}` of the current or last run.
    pub fn subscribe(&self) -> watch::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    pub async fn run(
        &self,
        scams: Vec<ScamEntry>,
        verified: Vec<VerifiedEntry>,
        shutdown: &ShutdownToken,
    ) -> Result<Snapshot> {
        let total = scams.len();
        tracing::info!(
            "🔍 Probing {} entries with up to {} concurrent probes",
            total,
            self.concurrency
        );

        let progress = Arc::new(Progress::new(total));
        self.events.send_replace(progress.event());
        let reporter = self.spawn_reporter(progress.clone());

        let targets: Vec<(usize, ScamEntry)> = scams.iter().cloned().enumerate().collect();
        let mut aggregator = Aggregator::new(scams, verified);

        let prober = &self.prober;
        // 串流在區塊結束時被丟棄，尚未完成的探測會一併取消
        let drained = {
            let outcomes = stream::iter(targets.into_iter().map(|(index, entry)| {
                let in_flight = progress.clone();
                async move {
                    let _guard = InFlight::enter(in_flight);
                    let outcome = prober.probe(&entry).await;
                    (index, outcome)
                }
            }))
            .buffer_unordered(self.concurrency);
            let mut outcomes = std::pin::pin!(outcomes);

            let cancelled = shutdown.cancelled();
            let mut cancelled = std::pin::pin!(cancelled);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancelled => break Err(EtlError::Cancelled),
                    next = outcomes.next() => match next {
                        Some((index, outcome)) => {
                            if let Err(e) = aggregator.absorb(index, outcome) {
                                break Err(e);
                            }
                            progress.checked.fetch_add(1, Ordering::Relaxed);
                        }
                        None => break Ok(()),
                    },
                }
            }
        };

        reporter.abort();
        let _ = reporter.await;
        self.events.send_replace(progress.event());

        if let Err(e) = drained {
            tracing::warn!(
                "Probe run stopped at {}/{}: {}",
                aggregator.checked(),
                total,
                e
            );
            return Err(e);
        }

        tracing::info!("✅ Checked {}/{} entries", aggregator.checked(), total);
        aggregator.finish()
    }

    fn spawn_reporter(&self, progress: Arc<Progress>) -> JoinHandle<()> {
        let period = self.progress_interval.max(Duration::from_millis(10));
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // 第一次 tick 會立即觸發
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let event = progress.event();
                tracing::info!(
                    checked = event.checked,
                    total = event.total,
                    pending = event.pending,
                    "{}/{} ({} requests pending)",
                    event.checked,
                    event.total,
                    event.pending
                );
                events.send_replace(event);
            }
        })
    }
}
