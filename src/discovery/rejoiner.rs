use std::sync::Arc;
use tokio::sync::RwLock;

use super::resolver::Resolver;
use crate::membership::layer::MembershipLayer;

/// Result of one discovery pass.
#[derive(Debug)]
pub enum DiscoveryOutcome {
    /// The seed list was handed to the membership layer.
    Joined { seeds: Vec<String>, contacted: usize },
    /// Nothing resolved; the join was skipped and the next tick retries.
    NoSeeds,
    /// The membership layer refused the join; the next tick retries.
    JoinFailed(String),
}

impl DiscoveryOutcome {
    pub fn is_joined(&self) -> bool {
        matches!(self, DiscoveryOutcome::Joined { .. })
    }
}

/// Turns configured service names into seed addresses for the membership layer.
pub struct DiscoveryRejoiner {
    resolver: Arc<dyn Resolver>,
    membership: Arc<dyn MembershipLayer>,
    service_names: RwLock<Vec<String>>,
}

impl DiscoveryRejoiner {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        membership: Arc<dyn MembershipLayer>,
        service_names: Vec<String>,
    ) -> Self {
        Self {
            resolver,
            membership,
            service_names: RwLock::new(service_names),
        }
    }

    /// Adds more service names; they are resolved from the next pass on.
    pub async fn add_service_names<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut service_names = self.service_names.write().await;
        for name in names {
            let name = name.into();
            if !service_names.contains(&name) {
                tracing::info!("Added service name {} to discovery", name);
                service_names.push(name);
            }
        }
    }

    pub async fn service_names(&self) -> Vec<String> {
        self.service_names.read().await.clone()
    }

    /// Resolves every service name and joins whatever resolved.
    ///
    /// Never fails: a name that does not resolve is skipped, and a failed
    /// join is reported in the outcome for the caller to log.
    pub async fn rejoin(&self) -> DiscoveryOutcome {
        let names = self.service_names().await;
        let seeds = self.resolve_seeds(&names).await;

        if seeds.is_empty() {
            tracing::debug!("No service name resolved to an address, skipping join");
            return DiscoveryOutcome::NoSeeds;
        }

        match self.membership.join(&seeds).await {
            Ok(contacted) => {
                tracing::debug!("Joined via {} of {} seed(s)", contacted, seeds.len());
                DiscoveryOutcome::Joined { seeds, contacted }
            }
            Err(e) => {
                tracing::warn!("Membership join with {} seed(s) failed: {}", seeds.len(), e);
                DiscoveryOutcome::JoinFailed(e.to_string())
            }
        }
    }

    async fn resolve_seeds(&self, names: &[String]) -> Vec<String> {
        let mut seeds = Vec::new();

        for name in names {
            match self.resolver.resolve(name).await {
                Ok(addresses) => {
                    tracing::trace!("{} resolved to {} address(es)", name, addresses.len());
                    seeds.extend(addresses.into_iter().map(|ip| ip.to_string()));
                }
                Err(e) => {
                    tracing::debug!("Failed to resolve {}: {}", name, e);
                }
            }
        }

        seeds
    }
}
