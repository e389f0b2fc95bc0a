use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

/// 探測後的存活狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LivenessStatus {
    Active,
    Inactive,
    Suspended,
    Offline,
}

impl std::fmt::Display for LivenessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LivenessStatus::Active => "Active",
            LivenessStatus::Inactive => "Inactive",
            LivenessStatus::Suspended => "Suspended",
            LivenessStatus::Offline => "Offline",
        };
        f.write_str(label)
    }
}

/// A scam entry as loaded from the scam list.
///
/// `status`, `ip` and `nameservers` stay empty until the entry has been
/// probed; after that the entry belongs to the snapshot and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScamEntry {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Hostname of `url` with a leading `www.` removed.
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LivenessStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ScamEntry {
    /// `[hostname, www.hostname]`
    pub fn host_forms(&self) -> [String; 2] {
        host_forms(&self.hostname)
    }

    pub fn is_probed(&self) -> bool {
        self.status.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedEntry {
    pub name: String,
    pub url: String,
    pub hostname: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl VerifiedEntry {
    pub fn host_forms(&self) -> [String; 2] {
        host_forms(&self.hostname)
    }
}

/// Both source lists after validation, in load order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceLists {
    pub scams: Vec<ScamEntry>,
    pub verified: Vec<VerifiedEntry>,
}

/// 單一條目的探測結果，交給 Aggregator 後即丟棄
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub hostname: String,
    pub resolved_ip: Option<String>,
    pub nameservers: Option<Vec<String>>,
    pub status: LivenessStatus,
}

/// The published result of one complete probing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub scams: Vec<ScamEntry>,
    pub verified: Vec<VerifiedEntry>,
    pub blacklist: BTreeSet<String>,
    pub whitelist: BTreeSet<String>,
    /// Payment address to the last scam entry (in list order) listing it.
    pub addresses: BTreeMap<String, ScamEntry>,
    /// Resolved IP to the last scam entry (in list order) resolving to it.
    pub ips: BTreeMap<String, ScamEntry>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Address,
    Ip,
    Domain,
}

/// Answer to "is this domain, IP or address known?"
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum CheckResult {
    Verified,
    Blocked {
        #[serde(rename = "type")]
        kind: BlockKind,
        entries: Vec<ScamEntry>,
    },
    Neutral,
}

impl Snapshot {
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.updated_at)
    }

    pub fn is_stale(&self, refresh_interval: Duration) -> bool {
        match chrono::Duration::from_std(refresh_interval) {
            Ok(interval) => self.age() >= interval,
            Err(_) => false,
        }
    }

    pub fn find_scam(&self, id: &str) -> Option<&ScamEntry> {
        self.scams.iter().find(|scam| scam.id == id)
    }

    /// Classifies a search term against the snapshot.
    ///
    /// Addresses are matched exactly; anything else is reduced to a host
    /// (scheme and path removed) and looked up in the whitelist first,
    /// then in the blacklist.
    pub fn check(&self, term: &str) -> CheckResult {
        let term = term.trim();
        if term.is_empty() {
            return CheckResult::Neutral;
        }

        if self.addresses.contains_key(term) {
            let entries = self
                .scams
                .iter()
                .filter(|scam| scam.addresses.iter().any(|a| a == term))
                .cloned()
                .collect();
            return CheckResult::Blocked {
                kind: BlockKind::Address,
                entries,
            };
        }

        let host = host_of(term);
        if self.whitelist.contains(&host) {
            return CheckResult::Verified;
        }
        if !self.blacklist.contains(&host) {
            return CheckResult::Neutral;
        }

        let bare = strip_www(&host);
        if host.parse::<IpAddr>().is_ok() {
            let entries = self
                .scams
                .iter()
                .filter(|scam| scam.ip.as_deref() == Some(host.as_str()) || scam.hostname == bare)
                .cloned()
                .collect();
            CheckResult::Blocked {
                kind: BlockKind::Ip,
                entries,
            }
        } else {
            let entries = self
                .scams
                .iter()
                .filter(|scam| scam.hostname == bare)
                .cloned()
                .collect();
            CheckResult::Blocked {
                kind: BlockKind::Domain,
                entries,
            }
        }
    }
}

/// 進度事件：已檢查數 / 總數 / 進行中的請求數
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub checked: usize,
    pub total: usize,
    pub pending: usize,
}

pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

pub fn host_forms(hostname: &str) -> [String; 2] {
    let bare = strip_www(hostname);
    [bare.to_string(), format!("www.{}", bare)]
}

/// 去掉協定、帳號、埠號與路徑，只留下主機部分
fn host_of(term: &str) -> String {
    let parsed = if term.contains("://") {
        Url::parse(term)
    } else {
        Url::parse(&format!("http://{}", term.trim_start_matches("//")))
    };

    match parsed.ok().as_ref().and_then(|url| url.host_str()) {
        Some(host) => host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase(),
        None => term.to_ascii_lowercase(),
    }
}
