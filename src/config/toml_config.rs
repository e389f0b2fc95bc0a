use crate::config::{DEFAULT_USER_AGENT, MAX_CONCURRENCY, SOURCE_EXTENSIONS};
use crate::core::coordinator::{DEFAULT_CONCURRENCY, DEFAULT_PROGRESS_INTERVAL};
use crate::core::prober::DEFAULT_PROBE_TIMEOUT;
use crate::core::publisher::DEFAULT_REFRESH_INTERVAL;
use crate::core::ConfigProvider;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub sources: SourcesConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub scams: String,
    pub verified: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub timeout_seconds: Option<u64>,
    pub concurrency: Option<usize>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    pub directory: Option<String>,
    pub refresh_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub progress_interval_ms: Option<u64>,
    pub system_stats: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${CACHE_DIR})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn system_stats_enabled(&self) -> bool {
        self.monitoring.system_stats.unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn scam_list_path(&self) -> &str {
        &self.sources.scams
    }

    fn verified_list_path(&self) -> &str {
        &self.sources.verified
    }

    fn cache_dir(&self) -> &str {
        self.cache.directory.as_deref().unwrap_or("_cache")
    }

    fn probe_timeout(&self) -> Duration {
        self.probe
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT)
    }

    fn concurrency(&self) -> usize {
        self.probe.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    fn refresh_interval(&self) -> Duration {
        self.cache
            .refresh_interval_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REFRESH_INTERVAL)
    }

    fn progress_interval(&self) -> Duration {
        self.monitoring
            .progress_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PROGRESS_INTERVAL)
    }

    fn user_agent(&self) -> &str {
        self.probe.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("sources.scams", &self.sources.scams)?;
        validation::validate_file_extension("sources.scams", &self.sources.scams, &SOURCE_EXTENSIONS)?;
        validation::validate_path("sources.verified", &self.sources.verified)?;
        validation::validate_file_extension(
            "sources.verified",
            &self.sources.verified,
            &SOURCE_EXTENSIONS,
        )?;
        validation::validate_path("cache.directory", self.cache_dir())?;

        if let Some(timeout) = self.probe.timeout_seconds {
            validation::validate_range("probe.timeout_seconds", timeout, 1, 3600)?;
        }
        if let Some(concurrency) = self.probe.concurrency {
            validation::validate_range("probe.concurrency", concurrency, 1, MAX_CONCURRENCY)?;
        }
        if let Some(interval) = self.cache.refresh_interval_seconds {
            validation::validate_range("cache.refresh_interval_seconds", interval, 1, u64::MAX)?;
        }
        if let Some(interval) = self.monitoring.progress_interval_ms {
            validation::validate_range("monitoring.progress_interval_ms", interval, 10, u64::MAX)?;
        }
        validation::validate_non_empty_string("probe.user_agent", self.user_agent())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let toml_content = r#"
[sources]
scams = "_data/scams.yaml"
verified = "_data/legit_urls.yaml"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.cache_dir(), "_cache");
        assert_eq!(config.probe_timeout(), Duration::from_secs(300));
        assert_eq!(config.concurrency(), DEFAULT_CONCURRENCY);
        assert_eq!(config.refresh_interval(), Duration::from_secs(7200));
        assert_eq!(config.user_agent(), DEFAULT_USER_AGENT);
        assert!(!config.system_stats_enabled());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[sources]
scams = "data/scams.yml"
verified = "data/legit.yml"

[probe]
timeout_seconds = 30
concurrency = 8
user_agent = "probe-bot"

[cache]
directory = "/var/cache/scams"
refresh_interval_seconds = 600

[monitoring]
progress_interval_ms = 250
system_stats = true
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency(), 8);
        assert_eq!(config.probe_timeout(), Duration::from_secs(30));
        assert_eq!(config.cache_dir(), "/var/cache/scams");
        assert_eq!(config.progress_interval(), Duration::from_millis(250));
        assert!(config.system_stats_enabled());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SCAM_SNAPSHOT_TEST_CACHE", "/tmp/scam-cache");

        let toml_content = r#"
[sources]
scams = "scams.yaml"
verified = "legit.yaml"

[cache]
directory = "${SCAM_SNAPSHOT_TEST_CACHE}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.cache_dir(), "/tmp/scam-cache");

        std::env::remove_var("SCAM_SNAPSHOT_TEST_CACHE");
    }

    #[test]
    fn test_config_validation() {
        let toml_content = r#"
[sources]
scams = "scams.json"
verified = "legit.yaml"
"#;
        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());

        let toml_content = r#"
[sources]
scams = "scams.yaml"
verified = "legit.yaml"

[probe]
concurrency = 0
"#;
        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_sources_is_parse_error() {
        let result = TomlConfig::from_toml_str("[probe]\nconcurrency = 4\n");
        assert!(matches!(
            result,
            Err(EtlError::ConfigValidationError { .. })
        ));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[sources]\nscams = \"a.yaml\"\nverified = \"b.yaml\"\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.scam_list_path(), "a.yaml");
    }
}
