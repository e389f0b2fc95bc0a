use crate::core::{Pipeline, Snapshot};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use crate::utils::shutdown::ShutdownToken;
use std::time::Instant;

/// Runs one extract → transform cycle of a pipeline.
pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self, shutdown: &ShutdownToken) -> Result<Snapshot> {
        let started = Instant::now();

        // Extract
        tracing::info!("📥 Loading source lists...");
        let lists = self.pipeline.extract().await?;
        tracing::info!(
            "📥 Loaded {} scam entries and {} verified entries",
            lists.scams.len(),
            lists.verified.len()
        );
        self.monitor.log_stats("Load");

        // Transform
        let snapshot = self.pipeline.transform(lists, shutdown).await?;
        self.monitor.log_stats("Probe");

        tracing::info!(
            "⏱️ Snapshot built in {:.1}s ({} blacklisted hosts, {} indexed IPs)",
            started.elapsed().as_secs_f64(),
            snapshot.blacklist.len(),
            snapshot.ips.len()
        );
        Ok(snapshot)
    }
}
