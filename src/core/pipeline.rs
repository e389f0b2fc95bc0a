use crate::adapters::HickoryResolver;
use crate::core::coordinator::Coordinator;
use crate::core::loader;
use crate::core::prober::Prober;
use crate::core::{ConfigProvider, Pipeline, Probe, ProgressEvent, Snapshot, SourceLists};
use crate::utils::error::Result;
use crate::utils::shutdown::ShutdownToken;
use tokio::sync::watch;

/// Reads both source lists from disk and probes every scam entry.
pub struct SnapshotPipeline<P: Probe, C: ConfigProvider> {
    config: C,
    coordinator: Coordinator<P>,
}

impl<P: Probe, C: ConfigProvider> SnapshotPipeline<P, C> {
    pub fn new(config: C, prober: P) -> Self {
        let coordinator = Coordinator::new(prober)
            .with_concurrency(config.concurrency())
            .with_progress_interval(config.progress_interval());
        Self {
            config,
            coordinator,
        }
    }

    pub fn progress(&self) -> watch::Receiver<ProgressEvent> {
        self.coordinator.subscribe()
    }
}

impl<C: ConfigProvider> SnapshotPipeline<Prober<HickoryResolver>, C> {
    /// Pipeline probing the real network through the system resolver.
    pub fn with_network(config: C) -> Result<Self> {
        let resolver = HickoryResolver::from_system()?;
        let prober = Prober::new(resolver, config.probe_timeout(), config.user_agent())?;
        Ok(Self::new(config, prober))
    }
}

#[async_trait::async_trait]
impl<P: Probe, C: ConfigProvider> Pipeline for SnapshotPipeline<P, C> {
    async fn extract(&self) -> Result<SourceLists> {
        tracing::debug!(
            "Reading sources {} and {}",
            self.config.scam_list_path(),
            self.config.verified_list_path()
        );
        loader::load_files(
            self.config.scam_list_path(),
            self.config.verified_list_path(),
        )
        .await
    }

    async fn transform(&self, lists: SourceLists, shutdown: &ShutdownToken) -> Result<Snapshot> {
        self.coordinator
            .run(lists.scams, lists.verified, shutdown)
            .await
    }
}
