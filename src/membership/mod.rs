//! Membership & Discovery Module
//!
//! Gossip-based membership protocol (inspired by SWIM). Instances use it to find
//! each other, detect failures and spread cluster state.
//!
//! ## Core Mechanisms
//! - **Gossip Protocol**: Nodes periodically exchange status updates via UDP to maintain a consistent view of the cluster.
//! - **Failure Detection**: Uses a "Suspect" -> "Dead" transition model with timeouts to handle node crashes gracefully.
//! - **Incarnation Numbers**: Solves conflict resolution when node state (Alive/Suspect) is disputed.
//!
//! The rest of the crate only talks to [`layer::MembershipLayer`]; the UDP
//! implementation lives in [`service::GossipMembership`].

pub mod config;
pub mod layer;
pub mod service;
pub mod types;
