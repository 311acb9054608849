use anyhow::Result;
use async_trait::async_trait;

use super::types::Node;

/// What the synchronization loop needs from a membership implementation.
#[async_trait]
pub trait MembershipLayer: Send + Sync {
    /// Contacts the given seed addresses and returns how many were reached.
    ///
    /// Fails when seeds were given and none could be reached. A seed that is
    /// the local node's own address needs no contact, so a list made only of
    /// it succeeds with zero.
    async fn join(&self, seeds: &[String]) -> Result<usize>;

    /// Every member currently considered live, the local node included.
    fn current_members(&self) -> Vec<Node>;

    /// Address of the local node as announced to peers.
    fn local_node(&self) -> String;
}
