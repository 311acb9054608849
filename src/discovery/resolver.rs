use anyhow::Result;
use async_trait::async_trait;
use std::net::IpAddr;

/// Name resolution seam. Implementations return every address a name maps
/// to; an empty list is a valid answer.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>>;
}

/// Resolves through the system resolver, which is what container DNS
/// (docker, kubernetes headless services) plugs into.
#[derive(Debug, Clone, Default)]
pub struct DnsResolver;

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>> {
        let mut ips: Vec<IpAddr> = tokio::net::lookup_host((name, 0))
            .await?
            .map(|addr| addr.ip())
            .collect();
        ips.sort();
        ips.dedup();
        Ok(ips)
    }
}
