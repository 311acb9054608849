use std::net::IpAddr;
use std::sync::RwLock;

use crate::membership::layer::MembershipLayer;
use crate::membership::types::host_of;

/// This instance's own address and readiness, as last computed by the tick loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalState {
    pub self_address: String,
    pub is_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready { address: String, changed: bool },
    /// The membership layer had no usable address for the local node.
    Unresolved,
}

/// Written by the tick loop, read concurrently by the sync server.
#[derive(Debug, Default)]
pub struct ReadinessTracker {
    state: RwLock<LocalState>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-reads the local node's address from the membership layer.
    ///
    /// Readiness means "our own address has been resolved at least once"; it
    /// is not a health check of anything else. Only [`Self::mark_unhealthy`]
    /// turns it back off.
    pub fn refresh(&self, membership: &dyn MembershipLayer) -> ReadinessOutcome {
        let reported = membership.local_node();

        let Some(address) = host_of(&reported).filter(|host| !is_unspecified(host)) else {
            tracing::warn!("Local node reported no usable address ({:?})", reported);
            return ReadinessOutcome::Unresolved;
        };

        let Ok(mut state) = self.state.write() else {
            tracing::error!("Local state lock poisoned, readiness not updated");
            return ReadinessOutcome::Unresolved;
        };

        let changed = state.self_address != address;
        if changed {
            if state.self_address.is_empty() {
                tracing::info!("Local address resolved to {}", address);
            } else {
                tracing::info!("Local address changed from {} to {}", state.self_address, address);
            }
            state.self_address = address.clone();
        }
        if !state.is_ready {
            tracing::info!("Instance is ready");
            state.is_ready = true;
        }

        ReadinessOutcome::Ready { address, changed }
    }

    /// Best-effort read; a poisoned lock reads as not ready.
    pub fn is_ready(&self) -> bool {
        self.state.read().map(|state| state.is_ready).unwrap_or(false)
    }

    pub fn snapshot(&self) -> LocalState {
        self.state
            .read()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    pub fn self_address(&self) -> String {
        self.snapshot().self_address
    }

    /// Leaves the state lock poisoned, as a writer panicking mid-update would.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.state.write();
            panic!("writer died holding the local state");
        }));
    }

    pub fn mark_unhealthy(&self) {
        match self.state.write() {
            Ok(mut state) => {
                if state.is_ready {
                    tracing::warn!("Instance marked not ready");
                }
                state.is_ready = false;
            }
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                state.is_ready = false;
                self.state.clear_poison();
            }
        }
    }
}

fn is_unspecified(host: &str) -> bool {
    host.parse::<IpAddr>()
        .map(|ip| ip.is_unspecified())
        .unwrap_or(false)
}
