use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::registry::PeerRegistry;
use crate::membership::types::{Node, NodeName, host_of};

/// Names that appeared and disappeared since the previous tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub added: BTreeMap<NodeName, String>,
    pub removed: BTreeMap<NodeName, String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A known name that came back with another address.
///
/// Names are expected to be stable identities, so this points at a node that
/// was re-addressed under the same name (or two nodes sharing one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressDrift {
    pub name: NodeName,
    pub previous: String,
    pub current: String,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub delta: Delta,
    /// Host of every live member, in snapshot order.
    pub addresses: Vec<String>,
    pub drifts: Vec<AddressDrift>,
}

/// Sole writer of the [`PeerRegistry`].
pub struct MembershipReconciler {
    registry: Arc<PeerRegistry>,
}

impl MembershipReconciler {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Diffs a membership snapshot against the registry, then merges it in.
    ///
    /// `removed` is every registered name missing from the snapshot, so a node
    /// that left keeps showing up there until it comes back. Re-running on the
    /// same snapshot never adds or drifts anything.
    pub fn reconcile(&self, snapshot: &[Node]) -> Reconciliation {
        let live: BTreeSet<&NodeName> = snapshot.iter().map(|node| &node.name).collect();
        let mut current: BTreeMap<NodeName, String> = BTreeMap::new();
        let mut addresses = Vec::with_capacity(snapshot.len());

        // A live member without a usable host is still live; only its
        // address is unknown this tick, so the registry keeps the last one.
        for node in snapshot {
            let Some(address) = host_of(&node.address) else {
                tracing::warn!("Member {} reported without an address, not synced this tick", node.name);
                continue;
            };
            addresses.push(address.clone());
            current.insert(node.name.clone(), address);
        }

        let removed: BTreeMap<NodeName, String> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|(name, _)| !live.contains(name))
            .collect();

        let mut delta = Delta {
            added: BTreeMap::new(),
            removed,
        };
        let mut drifts = Vec::new();

        for (name, address) in &current {
            match self.registry.record(name.clone(), address.clone()) {
                None => {
                    delta.added.insert(name.clone(), address.clone());
                }
                Some(previous) if previous != *address => {
                    tracing::warn!(
                        "Node {} changed address from {} to {}; names should be stable identities",
                        name,
                        previous,
                        address
                    );
                    drifts.push(AddressDrift {
                        name: name.clone(),
                        previous,
                        current: address.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        for (name, address) in &delta.added {
            tracing::info!("Node {} at {} has been added", name, address);
        }
        for (name, address) in &delta.removed {
            tracing::debug!("Node {} at {} is shut down", name, address);
        }

        Reconciliation {
            delta,
            addresses,
            drifts,
        }
    }
}
