//! Tick Scheduler
//!
//! A [`SyncInstance`] owns every piece of per-instance state and runs one tick
//! per interval: discovery, reconciliation, readiness, then the sync fan-out,
//! strictly in that order.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::time::MissedTickBehavior;

use super::config::SyncConfig;
use crate::discovery::rejoiner::{DiscoveryOutcome, DiscoveryRejoiner};
use crate::discovery::resolver::{DnsResolver, Resolver};
use crate::membership::layer::MembershipLayer;
use crate::membership::service::GossipMembership;
use crate::reconcile::reconciler::{MembershipReconciler, Reconciliation};
use crate::reconcile::registry::PeerRegistry;
use crate::readiness::tracker::{ReadinessOutcome, ReadinessTracker};
use crate::sync::handlers::{SyncServerState, sync_router};
use crate::sync::orchestrator::{PeerOutcome, SyncOrchestrator, SyncReport};
use crate::sync::transport::{HttpTransport, SyncTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Initializing,
    Discovering,
    /// A non-empty membership snapshot has just been seen for the first time.
    Joined,
    Idle,
    Syncing,
    /// The tick loop is gone and will not come back.
    Unhealthy,
}

/// Everything one tick did, for callers and tests; the loop itself only logs it.
#[derive(Debug)]
pub struct TickReport {
    pub tick: u64,
    pub discovery: DiscoveryOutcome,
    pub reconciliation: Reconciliation,
    pub readiness: ReadinessOutcome,
    pub sync: SyncReport,
}

pub struct SyncInstance {
    pub(super) config: SyncConfig,
    membership: Arc<dyn MembershipLayer>,
    rejoiner: DiscoveryRejoiner,
    reconciler: MembershipReconciler,
    pub(super) readiness: Arc<ReadinessTracker>,
    orchestrator: SyncOrchestrator,
    lifecycle: RwLock<InstanceState>,
    joined: AtomicBool,
    ticks: AtomicU64,
}

impl SyncInstance {
    /// Creates the instance with the gossip membership layer, DNS discovery and
    /// the HTTP sync transport, then runs a first discovery pass.
    ///
    /// Fails only when the configuration is invalid or the membership layer
    /// cannot be created (e.g. the gossip port is taken).
    pub async fn init(config: SyncConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let membership = GossipMembership::new(config.membership.clone().unwrap_or_default()).await?;
        membership.clone().start().await;

        let transport = HttpTransport::new()?;

        let instance = Self::from_parts(
            config,
            membership,
            Arc::new(DnsResolver),
            Arc::new(transport),
        )?;
        instance.discover().await;

        Ok(instance)
    }

    /// Builds an instance over caller-supplied collaborators.
    pub fn from_parts(
        config: SyncConfig,
        membership: Arc<dyn MembershipLayer>,
        resolver: Arc<dyn Resolver>,
        transport: Arc<dyn SyncTransport>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let rejoiner = DiscoveryRejoiner::new(resolver, membership.clone(), config.service_names.clone());
        let orchestrator = SyncOrchestrator::new(transport, config.sync_port, config.max_in_flight);

        Ok(Arc::new(Self {
            membership,
            rejoiner,
            reconciler: MembershipReconciler::new(Arc::new(PeerRegistry::new())),
            readiness: Arc::new(ReadinessTracker::new()),
            orchestrator,
            lifecycle: RwLock::new(InstanceState::Initializing),
            joined: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            config,
        }))
    }

    /// First discovery pass. Failure here is not fatal; ticks keep retrying.
    pub async fn discover(&self) -> DiscoveryOutcome {
        self.set_state(InstanceState::Discovering);

        let outcome = self.rejoiner.rejoin().await;
        match &outcome {
            DiscoveryOutcome::Joined { seeds, contacted } => {
                tracing::info!("Initial join contacted {} of {} seed(s)", contacted, seeds.len());
            }
            DiscoveryOutcome::NoSeeds => {
                tracing::info!("No peers found yet, starting alone");
            }
            DiscoveryOutcome::JoinFailed(reason) => {
                tracing::warn!("Initial join failed, will retry: {}", reason);
            }
        }
        outcome
    }

    /// Routes of the sync server, ready to be served.
    pub fn router(&self) -> axum::Router {
        sync_router(SyncServerState {
            readiness: self.readiness.clone(),
            hook: self.config.communication.clone(),
        })
    }

    pub async fn serve(&self, listener: tokio::net::TcpListener) -> Result<()> {
        tracing::info!("Sync server listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    pub async fn tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if self.joined.load(Ordering::Acquire) {
            self.set_state(InstanceState::Syncing);
        }

        let discovery = self.rejoiner.rejoin().await;

        let snapshot = self.membership.current_members();
        let reconciliation = self.reconciler.reconcile(&snapshot);

        let just_joined = !snapshot.is_empty() && !self.joined.swap(true, Ordering::AcqRel);
        if just_joined {
            tracing::info!("Joined cluster with {} live member(s)", snapshot.len());
            self.set_state(InstanceState::Joined);
        }

        let readiness = self.readiness.refresh(self.membership.as_ref());

        let sync = self.orchestrator.sync_peers(&reconciliation.addresses).await;
        tracing::debug!(
            "Tick {}: {} member(s), +{} -{}, {} synchronized",
            tick,
            reconciliation.addresses.len(),
            reconciliation.delta.added.len(),
            reconciliation.delta.removed.len(),
            sync.count(PeerOutcome::Completed)
        );

        if !just_joined {
            self.set_state(if self.joined.load(Ordering::Acquire) {
                InstanceState::Idle
            } else {
                InstanceState::Discovering
            });
        }

        TickReport {
            tick,
            discovery,
            reconciliation,
            readiness,
            sync,
        }
    }

    /// Ticks forever. A slow tick delays the next one instead of overlapping it.
    pub(super) async fn run_ticks(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    pub async fn add_service_names<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rejoiner.add_service_names(names).await;
    }

    pub fn state(&self) -> InstanceState {
        self.lifecycle
            .read()
            .map(|state| *state)
            .unwrap_or(InstanceState::Unhealthy)
    }

    pub(super) fn set_state(&self, next: InstanceState) {
        if let Ok(mut state) = self.lifecycle.write() {
            *state = next;
        }
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        self.reconciler.registry()
    }

    pub fn readiness(&self) -> &Arc<ReadinessTracker> {
        &self.readiness
    }

    pub fn membership(&self) -> &Arc<dyn MembershipLayer> {
        &self.membership
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}
