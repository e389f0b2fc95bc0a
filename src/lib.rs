pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::toml_config::TomlConfig;

pub use adapters::{HickoryResolver, LocalStorage};
pub use core::{
    etl::EtlEngine, pipeline::SnapshotPipeline, prober::Prober, publisher::SnapshotPublisher,
    CheckResult, Snapshot,
};
pub use utils::error::{EtlError, Result};
pub use utils::shutdown::ShutdownToken;
