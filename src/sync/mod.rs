//! Peer Synchronization Module
//!
//! The readiness-gated handshake between instances, both ends of it.
//!
//! ## Submodules
//! - **`protocol`**: endpoints and DTOs of the two remote operations.
//! - **`handlers`**: the server side (axum), answering probes and triggers.
//! - **`hook`**: the application-supplied communication step.
//! - **`transport`**: the client side: per-peer channels over HTTP.
//! - **`orchestrator`**: fans the handshake out over all live members.

pub mod handlers;
pub mod hook;
pub mod orchestrator;
pub mod protocol;
pub mod transport;

#[cfg(test)]
mod tests;
