//! Peer Discovery
//!
//! Resolves the configured service names (e.g. the DNS name a container
//! orchestrator gives to every replica of a service) and feeds the resulting
//! addresses to the membership layer as join seeds, once per tick.

pub mod rejoiner;
pub mod resolver;
