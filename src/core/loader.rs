use crate::core::{ScamEntry, SourceLists, VerifiedEntry};
use crate::domain::model::strip_www;
use crate::utils::error::{LoadError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use url::Url;

/// 探測結果欄位，來源清單裡若有同名欄位一律捨棄
const PROBED_FIELDS: [&str; 4] = ["status", "ip", "nameservers", "hostname"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for RawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawId::Number(n) => write!(f, "{}", n),
            RawId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawScamEntry {
    id: RawId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    subcategory: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    addresses: Vec<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawVerifiedEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

/// Parses and validates both YAML source lists.
///
/// Any entry without a URL aborts the whole load: a URL-less scam entry
/// means the list itself is corrupt.
pub fn load(scam_source: &str, legit_source: &str) -> Result<SourceLists> {
    let raw_scams: Vec<RawScamEntry> = parse_list("scam", scam_source)?;
    let raw_verified: Vec<RawVerifiedEntry> = parse_list("verified", legit_source)?;

    let mut seen_ids = HashSet::new();
    let mut scams = Vec::with_capacity(raw_scams.len());
    for raw in raw_scams {
        let entry = build_scam(raw)?;
        if !seen_ids.insert(entry.id.clone()) {
            return Err(LoadError::DuplicateId { id: entry.id }.into());
        }
        scams.push(entry);
    }

    let verified = raw_verified
        .into_iter()
        .map(build_verified)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    tracing::debug!(
        "Loaded {} scam entries and {} verified entries",
        scams.len(),
        verified.len()
    );

    Ok(SourceLists { scams, verified })
}

/// 從檔案讀取兩份清單後載入
pub async fn load_files<P: AsRef<Path>, Q: AsRef<Path>>(
    scam_path: P,
    legit_path: Q,
) -> Result<SourceLists> {
    let scam_source = tokio::fs::read_to_string(scam_path.as_ref()).await?;
    let legit_source = tokio::fs::read_to_string(legit_path.as_ref()).await?;
    load(&scam_source, &legit_source)
}

fn parse_list<T: serde::de::DeserializeOwned>(list: &str, source: &str) -> Result<Vec<T>> {
    if source.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(source).map_err(|e| {
        LoadError::MalformedSource {
            list: list.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn build_scam(raw: RawScamEntry) -> Result<ScamEntry> {
    let id = raw.id.to_string();
    let url = match raw.url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => {
            tracing::error!(id = %id, "entry missing url");
            return Err(LoadError::MissingUrl { id }.into());
        }
    };

    let url = normalize_scheme(&id, &url);
    let hostname = hostname_of(&id, &url)?;

    let mut extra = raw.extra;
    for field in PROBED_FIELDS {
        extra.remove(field);
    }

    Ok(ScamEntry {
        name: raw.name.unwrap_or_default(),
        id,
        url,
        hostname,
        category: raw.category,
        subcategory: raw.subcategory,
        description: raw.description,
        addresses: raw.addresses,
        status: None,
        ip: None,
        nameservers: None,
        extra,
    })
}

fn build_verified(raw: RawVerifiedEntry) -> Result<VerifiedEntry> {
    let name = raw.name.unwrap_or_default();
    let url = match raw.url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => return Err(LoadError::MissingVerifiedUrl { name }.into()),
    };

    let url = normalize_scheme(&name, &url);
    let hostname = hostname_of(&name, &url)?;

    let mut extra = raw.extra;
    extra.remove("hostname");

    Ok(VerifiedEntry {
        name,
        url,
        hostname,
        extra,
    })
}

/// Prefixes `http://` when the URL carries no http(s) scheme.
fn normalize_scheme(id: &str, url: &str) -> String {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return url.to_string();
    }

    tracing::warn!(
        id = %id,
        "⚠️ MalformedEntryWarning: entry {} has no protocol (http or https) specified, assuming http://",
        id
    );
    format!("http://{}", url)
}

fn hostname_of(id: &str, url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| LoadError::InvalidUrl {
        id: id.to_string(),
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(strip_www(host).to_string()),
        _ => Err(LoadError::InvalidUrl {
            id: id.to_string(),
            url: url.to_string(),
            reason: "URL has no host".to_string(),
        }
        .into()),
    }
}
