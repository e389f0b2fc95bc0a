use async_trait::async_trait;
use httpmock::prelude::*;
use scam_snapshot::core::{
    BlockKind, CheckResult, DnsResolver, LivenessStatus, Snapshot, Storage,
};
use scam_snapshot::core::publisher::{CACHE_FILE, DEFAULT_REFRESH_INTERVAL};
use scam_snapshot::utils::error::LoadError;
use scam_snapshot::{
    EtlEngine, EtlError, LocalStorage, Prober, SnapshotPipeline, SnapshotPublisher, TomlConfig,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// 以固定表格回答 DNS 查詢，不在表中的主機視為解析失敗
struct MockResolver {
    hosts: HashMap<String, IpAddr>,
}

#[async_trait]
impl DnsResolver for MockResolver {
    async fn lookup_ip(&self, hostname: &str) -> Result<IpAddr, String> {
        self.hosts
            .get(hostname)
            .copied()
            .ok_or_else(|| format!("no record for {}", hostname))
    }

    async fn lookup_ns(&self, hostname: &str) -> Result<Vec<String>, String> {
        if self.hosts.contains_key(hostname) {
            Ok(vec!["ns1.host.test".to_string(), "ns2.host.test".to_string()])
        } else {
            Err(format!("no NS records for {}", hostname))
        }
    }
}

type TestPublisher = SnapshotPublisher<SnapshotPipeline<Prober<MockResolver>, TomlConfig>, LocalStorage>;

struct Fixture {
    dir: TempDir,
    server: MockServer,
}

impl Fixture {
    async fn start() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            server: MockServer::start_async().await,
        }
    }

    fn url(&self, host: &str, path: &str) -> String {
        format!("http://{}:{}{}", host, self.server.port(), path)
    }

    fn scams_path(&self) -> PathBuf {
        self.dir.path().join("scams.yaml")
    }

    fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    fn write_lists(&self, scams: &str, verified: &str) {
        std::fs::write(self.scams_path(), scams).unwrap();
        std::fs::write(self.dir.path().join("legit_urls.yaml"), verified).unwrap();
    }

    fn config(&self) -> TomlConfig {
        let toml = format!(
            r#"
[sources]
scams = "{}"
verified = "{}"

[probe]
concurrency = 4

[cache]
directory = "{}"

[monitoring]
progress_interval_ms = 50
"#,
            self.scams_path().display(),
            self.dir.path().join("legit_urls.yaml").display(),
            self.cache_dir().display()
        );
        TomlConfig::from_toml_str(&toml).unwrap()
    }

    /// Every test host is routed to the mock server; `dead.test` points at a closed port.
    fn publisher(&self) -> TestPublisher {
        let address = *self.server.address();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .resolve("scam-live.test", address)
            .resolve("www.nano-clone.test", address)
            .resolve("nano-clone.test", address)
            .resolve("suspended.test", address)
            .resolve("dead.test", address)
            .build()
            .unwrap();

        let resolver = MockResolver {
            hosts: HashMap::from([
                ("scam-live.test".to_string(), "10.0.0.1".parse().unwrap()),
                ("www.nano-clone.test".to_string(), "10.0.0.3".parse().unwrap()),
                ("suspended.test".to_string(), "10.0.0.1".parse().unwrap()),
            ]),
        };

        let pipeline = SnapshotPipeline::new(self.config(), Prober::with_client(resolver, client));
        let engine = EtlEngine::new_with_monitoring(pipeline, false);
        SnapshotPublisher::new(engine, LocalStorage::new(self.cache_dir()), DEFAULT_REFRESH_INTERVAL)
    }

    async fn mock_sites(&self) -> httpmock::Mock<'_> {
        self.server
            .mock_async(|when, then| {
                when.method(GET).path("/wallet");
                then.status(200).body("<html>nano wallet</html>");
            })
            .await;
        self.server
            .mock_async(|when, then| {
                when.method(GET).path("/pow.wasm");
                then.status(404);
            })
            .await;
        self.server
            .mock_async(|when, then| {
                when.method(GET).path("/old");
                then.status(302)
                    .header("Location", "/cgi-sys/suspendedpage.cgi");
            })
            .await;
        self.server
            .mock_async(|when, then| {
                when.method(GET).path("/cgi-sys/suspendedpage.cgi");
                then.status(200).body("This account has been suspended");
            })
            .await;
        self.server
            .mock_async(|when, then| {
                when.method(GET).path("/live");
                then.status(200).body("send your coins here");
            })
            .await
    }

    fn full_lists(&self) -> (String, String) {
        let scams = format!(
            r#"
- id: 1
  name: Live giveaway
  url: {live}
  category: Phishing
  addresses:
    - xrb_live
    - xrb_shared
- id: 2
  name: Dead site
  url: http://dead.test:1/
  category: Phishing
- id: 3
  name: Wallet clone
  url: {nano}
  category: Phishing
  subcategory: NanoWallet
- id: 4
  name: Suspended site
  url: {suspended}
  category: Scamming
  addresses:
    - xrb_shared
"#,
            live = self.url("scam-live.test", "/live"),
            nano = self.url("www.nano-clone.test", "/wallet"),
            suspended = self.url("suspended.test", "/old"),
        );
        let verified = r#"
- name: Official wallet
  url: https://www.official-wallet.test
"#
        .to_string();
        (scams, verified)
    }
}

fn status_of(snapshot: &Snapshot, id: &str) -> Option<LivenessStatus> {
    snapshot.find_scam(id).and_then(|scam| scam.status)
}

fn ids(result: &CheckResult) -> Vec<String> {
    match result {
        CheckResult::Blocked { entries, .. } => entries.iter().map(|e| e.id.clone()).collect(),
        _ => vec![],
    }
}

#[tokio::test]
async fn test_rebuild_probes_every_entry_and_publishes() {
    let fixture = Fixture::start().await;
    let live = fixture.mock_sites().await;
    let (scams, verified) = fixture.full_lists();
    fixture.write_lists(&scams, &verified);

    let publisher = fixture.publisher();
    let snapshot = publisher.current().await.unwrap();

    assert_eq!(snapshot.scams.len(), 4);
    assert_eq!(status_of(&snapshot, "1"), Some(LivenessStatus::Active));
    assert_eq!(status_of(&snapshot, "2"), Some(LivenessStatus::Offline));
    assert_eq!(status_of(&snapshot, "3"), Some(LivenessStatus::Inactive));
    assert_eq!(status_of(&snapshot, "4"), Some(LivenessStatus::Suspended));
    live.assert_async().await;

    // 解析失敗的主機沒有 IP 與名稱伺服器
    let dead = snapshot.find_scam("2").unwrap();
    assert_eq!(dead.ip, None);
    assert_eq!(dead.nameservers, None);
    let clone = snapshot.find_scam("3").unwrap();
    assert_eq!(clone.hostname, "nano-clone.test");
    assert_eq!(clone.ip.as_deref(), Some("10.0.0.3"));
    assert_eq!(
        clone.nameservers,
        Some(vec!["ns1.host.test".to_string(), "ns2.host.test".to_string()])
    );

    for host in [
        "nano-clone.test",
        "www.nano-clone.test",
        "dead.test",
        "www.dead.test",
        "10.0.0.1",
        "10.0.0.3",
    ] {
        assert!(snapshot.blacklist.contains(host), "{} not blacklisted", host);
    }
    assert!(snapshot.whitelist.contains("official-wallet.test"));
    assert!(snapshot.whitelist.contains("www.official-wallet.test"));

    // 同一位址或 IP 出現多次時，清單中最後一筆為準
    assert_eq!(snapshot.addresses["xrb_shared"].id, "4");
    assert_eq!(snapshot.addresses["xrb_live"].id, "1");
    assert_eq!(snapshot.ips["10.0.0.1"].id, "4");
    assert_eq!(snapshot.ips["10.0.0.3"].id, "3");

    let stored = std::fs::read(fixture.cache_dir().join(CACHE_FILE)).unwrap();
    let stored: Snapshot = serde_json::from_slice(&stored).unwrap();
    assert_eq!(stored, *snapshot);
}

#[tokio::test]
async fn test_check_against_published_snapshot() {
    let fixture = Fixture::start().await;
    fixture.mock_sites().await;
    let (scams, verified) = fixture.full_lists();
    fixture.write_lists(&scams, &verified);

    let snapshot = fixture.publisher().rebuild_now().await.unwrap();

    let result = snapshot.check("https://www.nano-clone.test/wallet?ref=1");
    assert!(matches!(result, CheckResult::Blocked { kind: BlockKind::Domain, .. }));
    assert_eq!(ids(&result), vec!["3"]);

    let result = snapshot.check("10.0.0.1");
    assert!(matches!(result, CheckResult::Blocked { kind: BlockKind::Ip, .. }));
    assert_eq!(ids(&result), vec!["1", "4"]);

    let result = snapshot.check("xrb_shared");
    assert!(matches!(result, CheckResult::Blocked { kind: BlockKind::Address, .. }));
    assert_eq!(ids(&result), vec!["1", "4"]);

    assert_eq!(snapshot.check("official-wallet.test"), CheckResult::Verified);
    assert_eq!(snapshot.check("example.org"), CheckResult::Neutral);
}

#[tokio::test]
async fn test_missing_url_keeps_previous_snapshot() {
    let fixture = Fixture::start().await;
    fixture.mock_sites().await;
    let (scams, verified) = fixture.full_lists();
    fixture.write_lists(&scams, &verified);

    let publisher = fixture.publisher();
    let first = publisher.rebuild_now().await.unwrap();
    let cache_path = fixture.cache_dir().join(CACHE_FILE);
    let cached = std::fs::read(&cache_path).unwrap();

    let broken = format!("{}\n- id: 7\n  name: No address\n  category: Phishing\n", scams);
    fixture.write_lists(&broken, &verified);

    let result = publisher.rebuild_now().await;
    assert!(matches!(
        result,
        Err(EtlError::Load(LoadError::MissingUrl { ref id })) if id == "7"
    ));

    assert_eq!(publisher.current().await.unwrap(), first);
    assert_eq!(std::fs::read(&cache_path).unwrap(), cached);
    assert_eq!(publisher.publish_count(), 1);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let fixture = Fixture::start().await;
    fixture.mock_sites().await;
    let (scams, verified) = fixture.full_lists();
    fixture.write_lists(&scams, &verified);

    let publisher = fixture.publisher();
    let first = publisher.rebuild_now().await.unwrap();
    let second = publisher.rebuild_now().await.unwrap();

    assert!(second.updated_at >= first.updated_at);

    let mut first = (*first).clone();
    first.updated_at = second.updated_at;
    assert_eq!(first, *second);
    assert_eq!(publisher.publish_count(), 2);
}

#[tokio::test]
async fn test_restart_restores_without_probing() {
    let fixture = Fixture::start().await;
    let live = fixture.mock_sites().await;
    let (scams, verified) = fixture.full_lists();
    fixture.write_lists(&scams, &verified);

    let published = fixture.publisher().rebuild_now().await.unwrap();
    let hits = live.hits_async().await;

    let restarted = fixture.publisher();
    let restored = restarted.restore().await.unwrap().unwrap();
    let served = restarted.current().await.unwrap();

    assert_eq!(restored, published);
    assert_eq!(served, published);
    assert!(!restarted.is_rebuilding());
    assert_eq!(live.hits_async().await, hits);
}

#[tokio::test]
async fn test_progress_reports_completion() {
    let fixture = Fixture::start().await;
    fixture.mock_sites().await;
    let (scams, verified) = fixture.full_lists();
    fixture.write_lists(&scams, &verified);

    let publisher = fixture.publisher();
    let progress = publisher.engine().pipeline().progress();
    publisher.rebuild_now().await.unwrap();

    let last = *progress.borrow();
    assert_eq!(last.total, 4);
    assert_eq!(last.checked, 4);
    assert_eq!(last.pending, 0);
}

#[tokio::test]
async fn test_local_storage_holds_cache_file() {
    let fixture = Fixture::start().await;
    fixture.mock_sites().await;
    let (scams, verified) = fixture.full_lists();
    fixture.write_lists(&scams, &verified);

    let storage = LocalStorage::new(fixture.cache_dir());
    assert!(!storage.exists(CACHE_FILE).await);

    fixture.publisher().rebuild_now().await.unwrap();

    assert!(storage.exists(CACHE_FILE).await);
    assert!(no_temp_files(&fixture.cache_dir()));
}

fn no_temp_files(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .all(|entry| !entry.file_name().to_string_lossy().ends_with(".tmp"))
}
