use crate::core::DnsResolver;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use std::net::IpAddr;

/// System-configured DNS resolver backed by hickory.
pub struct HickoryResolver {
    resolver: TokioResolver,
}

impl HickoryResolver {
    /// Uses the system resolver configuration (`/etc/resolv.conf`).
    pub fn from_system() -> Result<Self> {
        let resolver = TokioResolver::builder_tokio()
            .map_err(|e| EtlError::ConfigError {
                message: format!("failed to create DNS resolver: {}", e),
            })?
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl DnsResolver for HickoryResolver {
    async fn lookup_ip(&self, hostname: &str) -> std::result::Result<IpAddr, String> {
        let lookup = self
            .resolver
            .lookup_ip(hostname)
            .await
            .map_err(|e| e.to_string())?;

        // 與 getaddrinfo 行為一致，優先回傳 IPv4
        lookup
            .iter()
            .find(IpAddr::is_ipv4)
            .or_else(|| lookup.iter().next())
            .ok_or_else(|| format!("no address records for {}", hostname))
    }

    async fn lookup_ns(&self, hostname: &str) -> std::result::Result<Vec<String>, String> {
        let lookup = self
            .resolver
            .ns_lookup(hostname)
            .await
            .map_err(|e| e.to_string())?;

        let nameservers: Vec<String> = lookup
            .iter()
            .map(|ns| normalize_ns_name(&ns.to_string()))
            .collect();

        if nameservers.is_empty() {
            return Err(format!("no NS records for {}", hostname));
        }
        Ok(nameservers)
    }
}

fn normalize_ns_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}
