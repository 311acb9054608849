//! Sync Orchestrator
//!
//! Runs the readiness-gated handshake against every live member:
//! open channel -> probe readiness -> (only if ready) trigger communication ->
//! close channel. Peers are handled concurrently up to `max_in_flight`, but the
//! steps for a single peer always run in that order.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use super::protocol::CALL_TIMEOUT_MS;
use super::transport::{SyncChannel, SyncTransport};
use crate::error::CallError;

pub const CALL_TIMEOUT: Duration = Duration::from_millis(CALL_TIMEOUT_MS);
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerOutcome {
    /// Probe said ready and the trigger was acknowledged.
    Completed,
    /// Peer answered the probe with not-ready; no trigger was sent.
    NotReady,
    DialFailed,
    ProbeFailed,
    TriggerFailed,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub peers: Vec<(String, PeerOutcome)>,
}

impl SyncReport {
    pub fn count(&self, outcome: PeerOutcome) -> usize {
        self.peers.iter().filter(|(_, o)| *o == outcome).count()
    }

    pub fn outcome_for(&self, address: &str) -> Option<PeerOutcome> {
        self.peers
            .iter()
            .find(|(peer, _)| peer == address)
            .map(|(_, outcome)| *outcome)
    }
}

pub struct SyncOrchestrator {
    transport: Arc<dyn SyncTransport>,
    sync_port: u16,
    call_timeout: Duration,
    max_in_flight: usize,
}

impl SyncOrchestrator {
    pub fn new(transport: Arc<dyn SyncTransport>, sync_port: u16, max_in_flight: usize) -> Self {
        Self {
            transport,
            sync_port,
            call_timeout: CALL_TIMEOUT,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// One handshake per address; no retries within the pass.
    pub async fn sync_peers(&self, addresses: &[String]) -> SyncReport {
        let peers = stream::iter(addresses.iter().cloned())
            .map(|address| async move {
                let outcome = self.sync_peer(&address).await;
                (address, outcome)
            })
            .buffer_unordered(self.max_in_flight)
            .collect::<Vec<_>>()
            .await;

        SyncReport { peers }
    }

    pub async fn sync_peer(&self, address: &str) -> PeerOutcome {
        let mut channel = match self.transport.open(address, self.sync_port).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!("Cannot open sync channel to {}:{}: {}", address, self.sync_port, e);
                return PeerOutcome::DialFailed;
            }
        };

        let outcome = self.handshake(address, channel.as_mut()).await;

        if let Err(e) = channel.close().await {
            tracing::debug!("Closing sync channel to {} failed: {}", address, e);
        }

        outcome
    }

    async fn handshake(&self, address: &str, channel: &mut dyn SyncChannel) -> PeerOutcome {
        let ready = match self.bounded(channel.probe_readiness(self.call_timeout)).await {
            Ok(ready) => ready,
            Err(e) => {
                tracing::warn!("Readiness probe to {} failed: {}", address, e);
                return PeerOutcome::ProbeFailed;
            }
        };

        if !ready {
            tracing::debug!("Peer {} is not ready, skipping", address);
            return PeerOutcome::NotReady;
        }

        match self.bounded(channel.trigger_communication(self.call_timeout)).await {
            Ok(()) => {
                tracing::debug!("Synchronized with {}", address);
                PeerOutcome::Completed
            }
            Err(e) => {
                tracing::warn!("Communication with {} failed: {}", address, e);
                PeerOutcome::TriggerFailed
            }
        }
    }

    /// Puts a fresh deadline on a single call, whatever the transport does.
    async fn bounded<T, F>(&self, call: F) -> Result<T, CallError>
    where
        F: Future<Output = Result<T, CallError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Timeout(self.call_timeout)),
        }
    }
}
