//! Sync Network Protocol
//!
//! Endpoints and Data Transfer Objects of the two remote operations every
//! instance serves. Bodies are JSON; unknown fields are ignored on both sides
//! so that either end can grow new fields.

use serde::{Deserialize, Serialize};

/// Readiness probe: answers whether this instance is ready to exchange data.
pub const ENDPOINT_READY: &str = "/sync/ready";
/// Communication trigger: asks this instance to run its data exchange step.
pub const ENDPOINT_COMMUNICATE: &str = "/sync/communicate";

/// Fixed deadline of every outbound sync call.
pub const CALL_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadinessReply {
    #[serde(default)]
    pub is_ready: bool,
}

/// Empty acknowledgment, also used as the (empty) trigger request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommunicationAck {}
