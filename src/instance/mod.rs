//! Instance Wiring
//!
//! One [`scheduler::SyncInstance`] per process: it owns the peer registry and
//! local readiness, drives the tick loop and exposes the sync server routes.
//!
//! ## Lifecycle
//! `Initializing -> Discovering -> Joined -> Idle <-> Syncing`, and
//! `Unhealthy` once the supervisor stops restarting a failed tick loop.

pub mod config;
pub mod scheduler;
pub mod supervisor;
