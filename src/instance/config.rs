use anyhow::{Result, bail};
use std::time::Duration;

use crate::membership::config::MembershipConfig;
use crate::sync::hook::CommunicationHook;
use crate::sync::orchestrator::DEFAULT_MAX_IN_FLIGHT;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// What happens when the background tick loop dies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopFailurePolicy {
    /// Restart the loop with doubling backoff. Once `max_restarts` is used up
    /// the instance is marked unhealthy as with `MarkUnhealthy`.
    Restart {
        initial_backoff: Duration,
        max_backoff: Duration,
        max_restarts: Option<u32>,
    },
    /// Report not-ready to peers and stop; an outside process manager is
    /// expected to notice and replace the instance.
    MarkUnhealthy,
}

impl Default for LoopFailurePolicy {
    fn default() -> Self {
        LoopFailurePolicy::Restart {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_restarts: Some(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// TCP port the sync endpoints listen on, on every instance.
    pub sync_port: u16,
    /// Names resolved each tick to find peers.
    pub service_names: Vec<String>,
    /// Gossip settings; `None` uses [`MembershipConfig::default`].
    pub membership: Option<MembershipConfig>,
    /// Fixed for the lifetime of the instance.
    pub tick_interval: Duration,
    /// Peers handshaked concurrently. 1 handles them one after another.
    pub max_in_flight: usize,
    pub failure_policy: LoopFailurePolicy,
    pub communication: CommunicationHook,
}

impl SyncConfig {
    pub fn new<I, S>(sync_port: u16, service_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sync_port,
            service_names: service_names.into_iter().map(Into::into).collect(),
            membership: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            failure_policy: LoopFailurePolicy::default(),
            communication: CommunicationHook::noop(),
        }
    }

    pub fn with_membership(mut self, membership: MembershipConfig) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_failure_policy(mut self, policy: LoopFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_communication(mut self, hook: CommunicationHook) -> Self {
        self.communication = hook;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_port == 0 {
            bail!("sync port must be a fixed, non-zero port shared by all instances");
        }
        if self.tick_interval.is_zero() {
            bail!("tick interval must be greater than zero");
        }
        if self.max_in_flight == 0 {
            bail!("max_in_flight must be at least 1");
        }
        if let LoopFailurePolicy::Restart {
            initial_backoff,
            max_backoff,
            ..
        } = &self.failure_policy
            && initial_backoff > max_backoff
        {
            bail!("initial restart backoff exceeds the maximum backoff");
        }
        if let Some(membership) = &self.membership {
            membership.validate()?;
        }
        Ok(())
    }
}
