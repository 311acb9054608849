//! Gossip tuning knobs.
//!
//! Two presets exist: [`MembershipConfig::default`] for a regular LAN and
//! [`MembershipConfig::local`], a tighter profile for containers sharing one
//! host network, where failures should be noticed within a few seconds.

use anyhow::{Result, bail};
use std::net::SocketAddr;
use std::time::Duration;

use super::types::NodeName;

pub const DEFAULT_GOSSIP_PORT: u16 = 7946;

#[derive(Debug, Clone)]
pub struct MembershipConfig {
    pub node_name: NodeName,
    /// UDP address the gossip socket binds to.
    pub bind_addr: SocketAddr,
    /// Address announced to peers. Derived from the socket when unset.
    pub advertise_addr: Option<SocketAddr>,
    /// How often a random live peer is pinged.
    pub gossip_interval: Duration,
    /// How often member ages are checked for suspicion and death.
    pub probe_interval: Duration,
    /// How long a ping may go unanswered before its target becomes suspect.
    pub probe_timeout: Duration,
    /// Silence after which an alive member becomes suspect.
    pub suspect_timeout: Duration,
    /// Silence after which a suspect member is declared dead.
    pub dead_timeout: Duration,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_GOSSIP_PORT)),
            advertise_addr: None,
            gossip_interval: Duration::from_millis(200),
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(500),
            suspect_timeout: Duration::from_secs(5),
            dead_timeout: Duration::from_secs(10),
        }
    }
}

impl MembershipConfig {
    pub fn local() -> Self {
        Self {
            gossip_interval: Duration::from_millis(100),
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(200),
            suspect_timeout: Duration::from_secs(3),
            dead_timeout: Duration::from_secs(15),
            ..Self::default()
        }
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = NodeName(name.into());
        self
    }

    /// Port used when a seed address arrives without one.
    pub fn gossip_port(&self) -> u16 {
        self.bind_addr.port()
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_name.0.trim().is_empty() {
            bail!("membership node name must not be empty");
        }
        if self.gossip_interval.is_zero() || self.probe_interval.is_zero() {
            bail!("gossip and probe intervals must be greater than zero");
        }
        if self.probe_timeout.is_zero() || self.probe_timeout >= self.suspect_timeout {
            bail!(
                "probe timeout ({:?}) must be non-zero and shorter than suspect timeout ({:?})",
                self.probe_timeout,
                self.suspect_timeout
            );
        }
        if self.suspect_timeout >= self.dead_timeout {
            bail!(
                "suspect timeout ({:?}) must be shorter than dead timeout ({:?})",
                self.suspect_timeout,
                self.dead_timeout
            );
        }
        Ok(())
    }
}

fn default_node_name() -> NodeName {
    match std::env::var("HOSTNAME") {
        Ok(host) if !host.trim().is_empty() => NodeName(host.trim().to_string()),
        _ => NodeName::generate(),
    }
}
