use crate::domain::model::{ProbeOutcome, ScamEntry, Snapshot, SourceLists};
use crate::utils::error::Result;
use crate::utils::shutdown::ShutdownToken;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Durable storage for the published snapshot.
///
/// `write_file` must be atomic: a reader sees either the previous content
/// or the new content, never a partially written file.
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn scam_list_path(&self) -> &str;
    fn verified_list_path(&self) -> &str;
    fn cache_dir(&self) -> &str;
    fn probe_timeout(&self) -> Duration;
    fn concurrency(&self) -> usize;
    fn refresh_interval(&self) -> Duration;
    fn progress_interval(&self) -> Duration;
    fn user_agent(&self) -> &str;
}

/// DNS lookups used by the prober. Errors are reported as plain strings
/// because the prober only logs them.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn lookup_ip(&self, hostname: &str) -> std::result::Result<IpAddr, String>;
    async fn lookup_ns(&self, hostname: &str) -> std::result::Result<Vec<String>, String>;
}

/// Determines the facts for one entry. Never fails: every I/O problem is
/// folded into the outcome.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, entry: &ScamEntry) -> ProbeOutcome;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<SourceLists>;
    async fn transform(&self, lists: SourceLists, shutdown: &ShutdownToken) -> Result<Snapshot>;
}
