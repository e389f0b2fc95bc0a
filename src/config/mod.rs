pub mod toml_config;

#[cfg(feature = "cli")]
use crate::core::ConfigProvider;
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{self, Validate};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("scam-snapshot/", env!("CARGO_PKG_VERSION"));
pub const SOURCE_EXTENSIONS: [&str; 2] = ["yaml", "yml"];
pub const MAX_CONCURRENCY: usize = 1024;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "scam-snapshot")]
#[command(about = "Probe scam domains and publish a liveness snapshot")]
pub struct CliConfig {
    /// TOML configuration file; replaces the source/probe/cache flags below
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(long, default_value = "_data/scams.yaml")]
    pub scams: String,

    #[arg(long, default_value = "_data/legit_urls.yaml")]
    pub verified: String,

    #[arg(long, default_value = "_cache")]
    pub cache_dir: String,

    #[arg(long, default_value = "300")]
    pub timeout_seconds: u64,

    #[arg(long, default_value = "32")]
    pub concurrency: usize,

    /// Snapshot age after which a background rebuild starts
    #[arg(long, default_value = "7200")]
    pub refresh_interval_seconds: u64,

    #[arg(long, default_value = "1000")]
    pub progress_interval_ms: u64,

    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Keep running and refresh the snapshot whenever it goes stale
    #[arg(long)]
    pub watch: bool,

    /// Look up a domain, IP or payment address in the snapshot and print the verdict
    #[arg(long, value_name = "TERM")]
    pub check: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage after each rebuild")]
    pub monitor: bool,

    #[arg(long, help = "Emit JSON log lines")]
    pub json_logs: bool,
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn scam_list_path(&self) -> &str {
        &self.scams
    }

    fn verified_list_path(&self) -> &str {
        &self.verified
    }

    fn cache_dir(&self) -> &str {
        &self.cache_dir
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("scams", &self.scams)?;
        validation::validate_file_extension("scams", &self.scams, &SOURCE_EXTENSIONS)?;
        validation::validate_path("verified", &self.verified)?;
        validation::validate_file_extension("verified", &self.verified, &SOURCE_EXTENSIONS)?;
        validation::validate_path("cache_dir", &self.cache_dir)?;
        validation::validate_range("timeout_seconds", self.timeout_seconds, 1, 3600)?;
        validation::validate_range("concurrency", self.concurrency, 1, MAX_CONCURRENCY)?;
        validation::validate_range("refresh_interval_seconds", self.refresh_interval_seconds, 1, u64::MAX)?;
        validation::validate_range("progress_interval_ms", self.progress_interval_ms, 10, u64::MAX)?;
        validation::validate_non_empty_string("user_agent", &self.user_agent)?;
        Ok(())
    }
}
