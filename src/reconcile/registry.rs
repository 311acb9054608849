//! Peer Registry
//!
//! Every node name ever seen live, mapped to its last-known address. Entries
//! are never evicted: a node that left keeps its last address for diagnostics.

use dashmap::DashMap;
use std::collections::BTreeMap;

use crate::membership::types::NodeName;

#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: DashMap<NodeName, String>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &NodeName) -> Option<String> {
        self.peers.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &NodeName) -> bool {
        self.peers.contains_key(name)
    }

    /// Stores `address` for `name`, returning the address it replaced.
    pub(crate) fn record(&self, name: NodeName, address: String) -> Option<String> {
        self.peers.insert(name, address)
    }

    /// Sorted copy of the whole registry.
    pub fn snapshot(&self) -> BTreeMap<NodeName, String> {
        self.peers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
