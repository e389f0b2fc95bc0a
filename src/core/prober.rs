use crate::core::{DnsResolver, LivenessStatus, Probe, ProbeOutcome, ScamEntry};
use crate::domain::model::strip_www;
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Scam hosts are often slow or hostile on purpose, so the default is generous.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const SUSPENDED_PAGE_MARKER: &str = "cgi-sys/suspendedpage.cgi";
const NANO_WALLET_SUBCATEGORY: &str = "NanoWallet";
const NANO_WALLET_ASSET: &str = "pow.wasm";
const ACCEPTED_STATUS_CODES: [u16; 3] = [200, 301, 302];

/// DNS + HTTP liveness prober for a single entry.
pub struct Prober<R: DnsResolver> {
    resolver: R,
    client: Client,
}

impl<R: DnsResolver> Prober<R> {
    pub fn new(resolver: R, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self::with_client(resolver, client))
    }

    pub fn with_client(resolver: R, client: Client) -> Self {
        Self { resolver, client }
    }

    async fn resolve_ip(&self, entry: &ScamEntry, host: &str) -> Option<String> {
        match self.resolver.lookup_ip(host).await {
            Ok(ip) => Some(ip.to_string()),
            Err(e) => {
                tracing::warn!(id = %entry.id, "DNS lookup failed for {}: {}", host, e);
                None
            }
        }
    }

    async fn resolve_nameservers(&self, entry: &ScamEntry, host: &str) -> Option<Vec<String>> {
        match self.resolver.lookup_ns(host).await {
            Ok(nameservers) => Some(nameservers),
            Err(e) => {
                tracing::warn!(id = %entry.id, "NS lookup failed for {}: {}", host, e);
                None
            }
        }
    }

    async fn check_liveness(&self, entry: &ScamEntry, secondary_url: Option<String>) -> LivenessStatus {
        let mut response = match self.client.get(&entry.url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(id = %entry.id, "{} is offline: {}", entry.url, e);
                return LivenessStatus::Offline;
            }
        };

        if response.url().as_str().contains(SUSPENDED_PAGE_MARKER) {
            tracing::warn!(id = %entry.id, "{} redirects to a suspended page", entry.url);
            return LivenessStatus::Suspended;
        }

        let status = response.status().as_u16();
        if !ACCEPTED_STATUS_CODES.contains(&status) {
            tracing::warn!(id = %entry.id, "{} answered HTTP {}", entry.url, status);
            return LivenessStatus::Inactive;
        }

        // 只讀第一個區塊判斷是否為空，不把整個回應載入記憶體
        let first_chunk = match response.chunk().await {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(id = %entry.id, "Failed to read body of {}: {}", entry.url, e);
                return LivenessStatus::Offline;
            }
        };
        drop(response);
        if first_chunk.map_or(true, |chunk| chunk.is_empty()) {
            tracing::warn!(id = %entry.id, "{} returned an empty body", entry.url);
            return LivenessStatus::Inactive;
        }

        match secondary_url {
            Some(asset_url) => self.check_asset(entry, &asset_url).await,
            None => LivenessStatus::Active,
        }
    }

    /// 複製的錢包網站只有在能提供 pow.wasm 時才算真的在線
    async fn check_asset(&self, entry: &ScamEntry, asset_url: &str) -> LivenessStatus {
        match self.client.get(asset_url).send().await {
            Ok(response) if response.status().as_u16() == 200 => LivenessStatus::Active,
            Ok(response) => {
                tracing::warn!(
                    id = %entry.id,
                    "{} answered HTTP {}, marking inactive",
                    asset_url,
                    response.status().as_u16()
                );
                LivenessStatus::Inactive
            }
            Err(e) => {
                tracing::warn!(id = %entry.id, "{} failed: {}, marking inactive", asset_url, e);
                LivenessStatus::Inactive
            }
        }
    }
}

#[async_trait]
impl<R: DnsResolver> Probe for Prober<R> {
    async fn probe(&self, entry: &ScamEntry) -> ProbeOutcome {
        let parsed = Url::parse(&entry.url).ok();
        let host = parsed
            .as_ref()
            .and_then(|url| url.host_str())
            .unwrap_or(&entry.hostname)
            .to_string();

        let resolved_ip = self.resolve_ip(entry, &host).await;
        let nameservers = self.resolve_nameservers(entry, &host).await;

        let secondary_url = if entry.subcategory.as_deref() == Some(NANO_WALLET_SUBCATEGORY) {
            Some(asset_url(&host, parsed.as_ref().and_then(|url| url.port())))
        } else {
            None
        };
        let status = self.check_liveness(entry, secondary_url).await;

        tracing::debug!(id = %entry.id, "{} -> {}", entry.hostname, status);

        ProbeOutcome {
            hostname: entry.hostname.clone(),
            resolved_ip,
            nameservers,
            status,
        }
    }
}

fn asset_url(host: &str, port: Option<u16>) -> String {
    let host = strip_www(host);
    match port {
        Some(port) => format!("http://{}:{}/{}", host, port, NANO_WALLET_ASSET),
        None => format!("http://{}/{}", host, NANO_WALLET_ASSET),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::collections::BTreeMap;
    use std::net::IpAddr;

    struct MockResolver {
        ip: Option<IpAddr>,
        nameservers: Option<Vec<String>>,
    }

    impl MockResolver {
        fn resolving() -> Self {
            Self {
                ip: Some("192.0.2.10".parse().unwrap()),
                nameservers: Some(vec!["ns1.host.example".to_string()]),
            }
        }

        fn failing() -> Self {
            Self {
                ip: None,
                nameservers: None,
            }
        }
    }

    #[async_trait]
    impl DnsResolver for MockResolver {
        async fn lookup_ip(&self, hostname: &str) -> std::result::Result<IpAddr, String> {
            self.ip.ok_or_else(|| format!("no record for {}", hostname))
        }

        async fn lookup_ns(&self, hostname: &str) -> std::result::Result<Vec<String>, String> {
            self.nameservers
                .clone()
                .ok_or_else(|| format!("no NS for {}", hostname))
        }
    }

    fn entry(url: &str, subcategory: Option<&str>) -> ScamEntry {
        let host = Url::parse(url).unwrap().host_str().unwrap().to_string();
        ScamEntry {
            id: "1".to_string(),
            name: "Test".to_string(),
            url: url.to_string(),
            hostname: strip_www(&host).to_string(),
            category: None,
            subcategory: subcategory.map(str::to_string),
            description: None,
            addresses: vec![],
            status: None,
            ip: None,
            nameservers: None,
            extra: BTreeMap::new(),
        }
    }

    fn prober(resolver: MockResolver) -> Prober<MockResolver> {
        Prober::new(resolver, Duration::from_secs(5), "scam-snapshot-test").unwrap()
    }

    fn refused_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}/", port)
    }

    #[tokio::test]
    async fn test_probe_active_site() {
        let server = MockServer::start();
        let page = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("<html>send us your seed</html>");
        });

        let outcome = prober(MockResolver::resolving())
            .probe(&entry(&server.url("/"), None))
            .await;

        page.assert();
        assert_eq!(outcome.status, LivenessStatus::Active);
        assert_eq!(outcome.resolved_ip.as_deref(), Some("192.0.2.10"));
        assert_eq!(
            outcome.nameservers,
            Some(vec!["ns1.host.example".to_string()])
        );
        assert_eq!(outcome.hostname, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_probe_large_body_reads_only_first_chunk() {
        let server = MockServer::start();
        let page = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(vec![b'x'; 8 * 1024 * 1024]);
        });

        let outcome = prober(MockResolver::resolving())
            .probe(&entry(&server.url("/"), None))
            .await;

        page.assert();
        assert_eq!(outcome.status, LivenessStatus::Active);
    }

    #[tokio::test]
    async fn test_probe_refused_connection_is_offline() {
        let outcome = prober(MockResolver::resolving())
            .probe(&entry(&refused_url(), None))
            .await;
        assert_eq!(outcome.status, LivenessStatus::Offline);
    }

    #[tokio::test]
    async fn test_probe_timeout_is_offline() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .body("slow")
                .delay(Duration::from_secs(3));
        });

        let prober = Prober::new(
            MockResolver::resolving(),
            Duration::from_millis(200),
            "scam-snapshot-test",
        )
        .unwrap();
        let outcome = prober.probe(&entry(&server.url("/"), None)).await;
        assert_eq!(outcome.status, LivenessStatus::Offline);
    }

    #[tokio::test]
    async fn test_probe_suspended_redirect() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(302)
                .header("Location", "/cgi-sys/suspendedpage.cgi");
        });
        server.mock(|when, then| {
            when.method(GET).path("/cgi-sys/suspendedpage.cgi");
            then.status(200).body("Account suspended");
        });

        let outcome = prober(MockResolver::resolving())
            .probe(&entry(&server.url("/"), None))
            .await;
        assert_eq!(outcome.status, LivenessStatus::Suspended);
    }

    #[tokio::test]
    async fn test_probe_unexpected_status_is_inactive() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(404).body("not found");
        });

        let outcome = prober(MockResolver::resolving())
            .probe(&entry(&server.url("/"), None))
            .await;
        assert_eq!(outcome.status, LivenessStatus::Inactive);
    }

    #[tokio::test]
    async fn test_probe_empty_body_is_inactive() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200);
        });

        let outcome = prober(MockResolver::resolving())
            .probe(&entry(&server.url("/"), None))
            .await;
        assert_eq!(outcome.status, LivenessStatus::Inactive);
    }

    #[tokio::test]
    async fn test_probe_nano_wallet_requires_pow_asset() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("wallet");
        });
        let asset = server.mock(|when, then| {
            when.method(GET).path("/pow.wasm");
            then.status(404);
        });

        let outcome = prober(MockResolver::resolving())
            .probe(&entry(&server.url("/"), Some("NanoWallet")))
            .await;

        asset.assert();
        assert_eq!(outcome.status, LivenessStatus::Inactive);
    }

    #[tokio::test]
    async fn test_probe_nano_wallet_with_pow_asset_is_active() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("wallet");
        });
        server.mock(|when, then| {
            when.method(GET).path("/pow.wasm");
            then.status(200).body("wasm");
        });

        let outcome = prober(MockResolver::resolving())
            .probe(&entry(&server.url("/"), Some("NanoWallet")))
            .await;
        assert_eq!(outcome.status, LivenessStatus::Active);
    }

    #[tokio::test]
    async fn test_dns_failure_does_not_decide_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("still serving");
        });

        let outcome = prober(MockResolver::failing())
            .probe(&entry(&server.url("/"), None))
            .await;

        assert!(outcome.resolved_ip.is_none());
        assert!(outcome.nameservers.is_none());
        assert_eq!(outcome.status, LivenessStatus::Active);
    }

    #[test]
    fn test_asset_url_strips_www_and_keeps_port() {
        assert_eq!(
            asset_url("www.wallet.example", None),
            "http://wallet.example/pow.wasm"
        );
        assert_eq!(
            asset_url("127.0.0.1", Some(8080)),
            "http://127.0.0.1:8080/pow.wasm"
        );
    }
}
