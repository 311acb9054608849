//! Local Readiness
//!
//! Tracks this instance's own address and whether it is ready to take part in
//! synchronization. Peers learn the flag through the readiness probe.

pub mod tracker;
