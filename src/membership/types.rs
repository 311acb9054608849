use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// Stable identity of a cluster member, assigned by the membership layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeName(pub String);

impl NodeName {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// A live participant as seen by the rest of the crate: a name and the
/// address the membership layer reported for it (which may carry a port).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: NodeName,
    pub address: String,
}

impl Node {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: NodeName(name.into()),
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

/// Gossip-side record of a member.
///
/// The `incarnation` field is a logical clock used to order updates and resolve
/// conflicts (e.g., refuting a false "Suspect" claim).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub name: NodeName,
    pub addr: SocketAddr,
    pub state: NodeState,
    pub incarnation: u64,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

impl Member {
    pub fn to_node(&self) -> Node {
        Node {
            name: self.name.clone(),
            address: self.addr.to_string(),
        }
    }
}

/// The wire protocol for gossip datagrams.
///
/// - `Ping/Ack`: liveness checks and state synchronization.
/// - `Join`: sent by a node to its seeds to enter the cluster.
/// - `Suspect/Alive`: disseminates changes in node health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    Ping {
        from: NodeName,
        incarnation: u64,
    },

    Ack {
        from: NodeName,
        incarnation: u64,
        members: Vec<Member>,
    },

    Join {
        member: Member,
    },

    Suspect {
        name: NodeName,
        incarnation: u64,
    },

    Alive {
        name: NodeName,
        incarnation: u64,
    },
}

/// Reduces an address such as `10.0.0.1:7946`, `[fe80::1]:80`, `::1` or
/// `db-0:5432` to its host part. Returns `None` when no host is left.
pub fn host_of(address: &str) -> Option<String> {
    let address = address.trim();

    if let Ok(socket) = address.parse::<SocketAddr>() {
        return Some(socket.ip().to_string());
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Some(ip.to_string());
    }

    let host = match address.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => address,
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
