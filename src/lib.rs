//! Peer Synchronization Library
//!
//! Keeps the replicas of a horizontally scaled service aware of one another
//! without a coordinator, and runs a readiness-gated handshake between them
//! once per tick.
//!
//! ## Architecture Modules
//! - **`membership`**: UDP gossip membership (SWIM-like) behind the
//!   `MembershipLayer` trait: join, live member snapshot, local address.
//! - **`discovery`**: resolves service names to seed addresses and rejoins
//!   the membership layer each tick.
//! - **`reconcile`**: the never-shrinking peer registry and the per-tick
//!   joined/left diff against it.
//! - **`readiness`**: this instance's own address and ready flag.
//! - **`sync`**: the probe/trigger RPC, both the axum endpoints and the
//!   orchestrator that calls them on every live peer.
//! - **`instance`**: wiring, the tick loop and its supervisor.

pub mod discovery;
pub mod error;
pub mod instance;
pub mod membership;
pub mod readiness;
pub mod reconcile;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;
