use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    /// 給日誌收集系統使用
    Json,
}

fn default_filter(verbose: bool) -> EnvFilter {
    // RUST_LOG 優先於 --verbose
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("scam_snapshot=debug,info")
        } else {
            EnvFilter::new("scam_snapshot=info,warn")
        }
    })
}

pub fn init_logger(verbose: bool, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(default_filter(verbose));
    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Compact => registry.with(layer.compact()).init(),
        LogFormat::Json => registry.with(layer.json()).init(),
    }
}

pub fn init_cli_logger(verbose: bool) {
    init_logger(verbose, LogFormat::Compact);
}
