use thiserror::Error;

/// 載入來源清單時的致命錯誤，任何一種都會中止整次重建
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Malformed {list} list: {message}")]
    MalformedSource { list: String, message: String },

    #[error("Fatal error: scam without URL found ({id})")]
    MissingUrl { id: String },

    #[error("Verified entry '{name}' has no URL")]
    MissingVerifiedUrl { name: String },

    #[error("Entry {id} has an invalid URL '{url}': {reason}")]
    InvalidUrl {
        id: String,
        url: String,
        reason: String,
    },

    #[error("Duplicate scam id: {id}")]
    DuplicateId { id: String },
}

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Source load failed: {0}")]
    Load(#[from] LoadError),

    #[error("HTTP client error: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Rebuild cancelled before completion")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Data,
    Storage,
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            EtlError::ApiError(_) => ErrorCategory::Network,
            EtlError::Load(_) | EtlError::ProcessingError { .. } => ErrorCategory::Data,
            EtlError::IoError(_) | EtlError::SerializationError(_) => ErrorCategory::Storage,
            EtlError::Cancelled => ErrorCategory::Runtime,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::Cancelled => ErrorSeverity::Low,
            EtlError::ApiError(_) => ErrorSeverity::Medium,
            EtlError::Load(_)
            | EtlError::ProcessingError { .. }
            | EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => ErrorSeverity::High,
            EtlError::IoError(_) | EtlError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EtlError::Load(LoadError::MissingUrl { .. }) => {
                "Add a url to the reported entry in the scam list"
            }
            EtlError::Load(LoadError::DuplicateId { .. }) => {
                "Give every scam entry a unique id"
            }
            EtlError::Load(_) => "Check that both source lists are valid YAML sequences",
            EtlError::ApiError(_) => "Check TLS support and the probe user agent settings",
            EtlError::IoError(_) => "Check that the cache directory exists and is writable",
            EtlError::SerializationError(_) => "Delete the corrupt cache file and rebuild",
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => "Review the configuration file and flags",
            EtlError::ProcessingError { .. } => "Re-run the rebuild; report the issue if it persists",
            EtlError::Cancelled => "No action needed; the previous snapshot is still served",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::Load(e) => format!("Could not load the source lists: {}", e),
            EtlError::Cancelled => "Rebuild was interrupted".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
