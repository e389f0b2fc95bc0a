use clap::Parser;
use scam_snapshot::core::{ConfigProvider, LivenessStatus, Pipeline, Snapshot, Storage};
use scam_snapshot::utils::error::{EtlError, ErrorSeverity};
use scam_snapshot::utils::logger::{self, LogFormat};
use scam_snapshot::utils::validation::Validate;
use scam_snapshot::{
    CliConfig, EtlEngine, LocalStorage, ShutdownToken, SnapshotPipeline, SnapshotPublisher,
    TomlConfig,
};
use std::collections::BTreeMap;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_logger(cli.verbose, LogFormat::Json);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting scam-snapshot v{}", env!("CARGO_PKG_VERSION"));
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let result = match cli.config.clone() {
        Some(path) => match TomlConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!("📄 Loaded configuration from {}", path);
                let monitor = cli.monitor || config.system_stats_enabled();
                execute(config, &cli, monitor).await
            }
            Err(e) => Err(e),
        },
        None => {
            let monitor = cli.monitor;
            execute(cli.clone(), &cli, monitor).await
        }
    };

    if let Err(e) = result {
        exit_with(e);
    }
}

async fn execute<C>(config: C, cli: &CliConfig, monitor: bool) -> Result<(), EtlError>
where
    C: ConfigProvider + Validate + 'static,
{
    // 驗證配置
    config.validate()?;

    if monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.cache_dir());
    let refresh_interval = config.refresh_interval();
    let check_every = (refresh_interval / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));

    let pipeline = SnapshotPipeline::with_network(config)?;
    let engine = EtlEngine::new_with_monitoring(pipeline, monitor);
    let shutdown = ShutdownToken::new();
    shutdown.cancel_on_ctrl_c();

    let publisher = SnapshotPublisher::with_shutdown(engine, storage, refresh_interval, shutdown);

    if cli.watch {
        watch(&publisher, check_every, cli.check.as_deref()).await
    } else {
        let snapshot = match publisher.rebuild_now().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // 重建失敗時仍可使用上次的快照回答查詢
                if let Some(term) = cli.check.as_deref() {
                    if let Ok(Some(previous)) = publisher.restore().await {
                        tracing::warn!("Answering from the previous snapshot: {}", e);
                        print_check(&previous, term)?;
                    }
                }
                return Err(e);
            }
        };
        print_summary(&snapshot);
        if let Some(term) = cli.check.as_deref() {
            print_check(&snapshot, term)?;
        }
        Ok(())
    }
}

async fn watch<P, S>(
    publisher: &SnapshotPublisher<P, S>,
    check_every: Duration,
    term: Option<&str>,
) -> Result<(), EtlError>
where
    P: Pipeline + 'static,
    S: Storage + 'static,
{
    publisher.restore().await?;
    let snapshot = publisher.current().await?;
    print_summary(&snapshot);
    if let Some(term) = term {
        print_check(&snapshot, term)?;
    }

    let mut updates = publisher.subscribe();
    let shutdown = publisher.shutdown_token().clone();
    let mut ticker = tokio::time::interval(check_every);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("🛑 Shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                // 過期時於背景重建
                publisher.current().await?;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(snapshot) = latest {
                    print_summary(&snapshot);
                }
            }
        }
    }
}

fn print_summary(snapshot: &Snapshot) {
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for scam in &snapshot.scams {
        let status = scam
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| LivenessStatus::Offline.to_string());
        *by_status.entry(status).or_default() += 1;
    }

    println!("✅ Snapshot updated at {}", snapshot.updated_at);
    println!(
        "   {} scams, {} verified, {} blacklisted hosts, {} addresses, {} IPs",
        snapshot.scams.len(),
        snapshot.verified.len(),
        snapshot.blacklist.len(),
        snapshot.addresses.len(),
        snapshot.ips.len()
    );
    for (status, count) in by_status {
        println!("   {:<10} {}", status, count);
    }
}

fn print_check(snapshot: &Snapshot, term: &str) -> Result<(), EtlError> {
    let result = snapshot.check(term);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn exit_with(e: EtlError) -> ! {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ scam-snapshot failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}
