pub mod aggregator;
pub mod coordinator;
pub mod etl;
pub mod loader;
pub mod pipeline;
pub mod prober;
pub mod publisher;

pub use crate::domain::model::{
    BlockKind, CheckResult, LivenessStatus, ProbeOutcome, ProgressEvent, ScamEntry, Snapshot,
    SourceLists, VerifiedEntry,
};
pub use crate::domain::ports::{ConfigProvider, DnsResolver, Pipeline, Probe, Storage};
pub use crate::utils::error::Result;
