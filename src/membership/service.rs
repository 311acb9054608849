use anyhow::{Result, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::info;

use super::config::MembershipConfig;
use super::layer::MembershipLayer;
use super::types::{GossipMessage, Member, Node, NodeName, NodeState};

pub struct GossipMembership {
    pub local_member: Member,
    pub members: Arc<DashMap<NodeName, Member>>,
    config: MembershipConfig,
    socket: Arc<UdpSocket>,
    incarnation: Arc<RwLock<u64>>,
    /// Members pinged and not heard from since, with the time of the first such ping.
    pending_acks: DashMap<NodeName, Instant>,
}

impl GossipMembership {
    /// Binds the gossip socket. The only fatal failure of the membership layer
    /// happens here (bad configuration, port already taken).
    pub async fn new(config: MembershipConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let socket = UdpSocket::bind(config.bind_addr).await?;
        let advertise = advertise_addr(&config, socket.local_addr()?);

        let incarnation_counter = Arc::new(RwLock::new(1));
        let current_inc = *incarnation_counter.read().await;
        let local_member = Member {
            name: config.node_name.clone(),
            addr: advertise,
            state: NodeState::Alive,
            incarnation: current_inc,
            last_seen: Some(Instant::now()),
        };

        let members = Arc::new(DashMap::new());
        members.insert(local_member.name.clone(), local_member.clone());

        info!(
            "Gossip membership bound on {} as {} (advertising {})",
            config.bind_addr, local_member.name, advertise
        );

        Ok(Arc::new(Self {
            local_member,
            members,
            config,
            socket: Arc::new(socket),
            incarnation: incarnation_counter,
            pending_acks: DashMap::new(),
        }))
    }

    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting membership service...");

        let _gossip_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.gossip_loop().await;
            })
        };

        let _receive_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.receive_loop().await;
            })
        };

        let _failure_detection_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.failure_detection_loop().await;
            })
        };

        tracing::info!("All membership background tasks started");
    }

    pub fn get_alive_members(&self) -> Vec<Member> {
        self.members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get_member(&self, name: &NodeName) -> Option<Member> {
        self.members.get(name).map(|entry| entry.value().clone())
    }

    fn seed_addr(&self, seed: &str) -> Option<SocketAddr> {
        if let Ok(addr) = seed.parse::<SocketAddr>() {
            return Some(addr);
        }
        seed.parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.config.gossip_port()))
    }

    async fn gossip_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.gossip_interval);

        loop {
            interval.tick().await;

            for msg in self.expire_probes(Instant::now()) {
                self.broadcast_message(msg).await;
            }

            let alive_members: Vec<Member> = self
                .members
                .iter()
                .filter(|entry| {
                    entry.value().name != self.local_member.name
                        && entry.value().state == NodeState::Alive
                })
                .map(|entry| entry.value().clone())
                .collect();

            if alive_members.is_empty() {
                continue;
            }

            use rand::Rng;
            let idx = rand::thread_rng().gen_range(0..alive_members.len());
            let target = &alive_members[idx];

            if let Err(e) = self.ping(target).await {
                tracing::warn!("Failed to send ping to {}: {}", target.name, e);
            }
        }
    }

    /// Pings `target` and starts waiting for its ack.
    pub(crate) async fn ping(&self, target: &Member) -> Result<()> {
        let incarnation = *self.incarnation.read().await;
        let msg = GossipMessage::Ping {
            from: self.local_member.name.clone(),
            incarnation,
        };

        let encoded = bincode::serialize(&msg)?;
        self.socket.send_to(&encoded, target.addr).await?;
        self.pending_acks
            .entry(target.name.clone())
            .or_insert_with(Instant::now);

        tracing::trace!("Sent ping to {}", target.name);
        Ok(())
    }

    /// Suspects every alive member whose ping went unanswered for longer than
    /// the probe timeout, returning the suspicions to broadcast.
    pub(crate) fn expire_probes(&self, now: Instant) -> Vec<GossipMessage> {
        let expired: Vec<NodeName> = self
            .pending_acks
            .iter()
            .filter(|entry| now.duration_since(*entry.value()) > self.config.probe_timeout)
            .map(|entry| entry.key().clone())
            .collect();

        let mut suspicions = Vec::new();
        for name in expired {
            self.pending_acks.remove(&name);

            if let Some(mut member) = self.members.get_mut(&name)
                && member.state == NodeState::Alive
            {
                tracing::warn!(
                    "Node {} suspected (no ack within {:?})",
                    name,
                    self.config.probe_timeout
                );
                member.state = NodeState::Suspect;
                suspicions.push(GossipMessage::Suspect {
                    name: name.clone(),
                    incarnation: member.incarnation,
                });
            }
        }
        suspicions
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<GossipMessage>(&buf[..len]) {
                    Ok(msg) => {
                        if let Err(e) = self.handle_message(msg, src).await {
                            tracing::error!("Error handling gossip from {}: {}", src, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to deserialize gossip from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    pub(crate) async fn handle_message(&self, msg: GossipMessage, src: SocketAddr) -> Result<()> {
        match msg {
            GossipMessage::Ping { from, incarnation } => {
                self.handle_ping(from, incarnation, src).await?;
            }

            GossipMessage::Ack {
                from,
                incarnation,
                members,
            } => {
                self.handle_ack(from, incarnation, members).await?;
            }

            GossipMessage::Join { member } => {
                self.handle_join(member, src).await?;
            }

            GossipMessage::Suspect { name, incarnation } => {
                self.handle_suspect(name, incarnation).await?;
            }

            GossipMessage::Alive { name, incarnation } => {
                self.handle_alive(name, incarnation).await?;
            }
        }

        Ok(())
    }

    async fn handle_ping(&self, from: NodeName, from_incarnation: u64, src: SocketAddr) -> Result<()> {
        tracing::trace!("Received ping from {}", from);
        self.pending_acks.remove(&from);

        if let Some(mut member) = self.members.get_mut(&from) {
            member.last_seen = Some(Instant::now());

            if from_incarnation > member.incarnation {
                member.incarnation = from_incarnation;
            }
            if member.state == NodeState::Suspect {
                member.state = NodeState::Alive;
            }
        } else {
            tracing::info!("Discovered new member via ping: {} at {}", from, src);

            let new_member = Member {
                name: from.clone(),
                addr: src,
                state: NodeState::Alive,
                incarnation: from_incarnation,
                last_seen: Some(Instant::now()),
            };

            self.members.insert(new_member.name.clone(), new_member);
        }

        self.send_ack(src).await
    }

    async fn send_ack(&self, to: SocketAddr) -> Result<()> {
        let all_members: Vec<Member> = self
            .members
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let my_incarnation = *self.incarnation.read().await;
        let reply = GossipMessage::Ack {
            from: self.local_member.name.clone(),
            incarnation: my_incarnation,
            members: all_members,
        };

        let encoded = bincode::serialize(&reply)?;
        self.socket.send_to(&encoded, to).await?;

        tracing::trace!("Sent ack to {} with {} members", to, self.members.len());

        Ok(())
    }

    async fn handle_ack(&self, from: NodeName, from_incarnation: u64, members: Vec<Member>) -> Result<()> {
        tracing::trace!(
            "Received ack from {} (inc={}) with {} members",
            from,
            from_incarnation,
            members.len()
        );
        self.pending_acks.remove(&from);

        if let Some(mut member) = self.members.get_mut(&from) {
            member.last_seen = Some(Instant::now());
            if from_incarnation > member.incarnation {
                member.incarnation = from_incarnation;
            }
            if member.state == NodeState::Suspect {
                member.state = NodeState::Alive;
            }
        }

        for member in members {
            self.merge_member(member);
        }

        Ok(())
    }

    fn merge_member(&self, new_member: Member) {
        if new_member.name == self.local_member.name {
            return;
        }

        match self.members.get_mut(&new_member.name) {
            Some(mut existing) => {
                if new_member.incarnation > existing.incarnation {
                    tracing::debug!(
                        "Updating {}: inc {} -> {}",
                        new_member.name,
                        existing.incarnation,
                        new_member.incarnation,
                    );

                    existing.state = new_member.state;
                    existing.incarnation = new_member.incarnation;
                    existing.addr = new_member.addr;
                    existing.last_seen = Some(Instant::now());
                } else if new_member.incarnation == existing.incarnation
                    && new_member.state == NodeState::Alive
                    && existing.state == NodeState::Suspect
                {
                    tracing::info!("{} refuted suspicion", new_member.name);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                if new_member.state == NodeState::Dead {
                    return;
                }

                tracing::info!("Discovered new member: {} at {}", new_member.name, new_member.addr);

                let mut member_with_timestamp = new_member;
                member_with_timestamp.last_seen = Some(Instant::now());

                self.members
                    .insert(member_with_timestamp.name.clone(), member_with_timestamp);
            }
        }
    }

    async fn handle_suspect(&self, name: NodeName, incarnation: u64) -> Result<()> {
        if name == self.local_member.name {
            let my_incarnation = {
                let mut inc = self.incarnation.write().await;
                if incarnation < *inc {
                    return Ok(());
                }
                *inc = incarnation + 1;
                *inc
            };

            tracing::info!("Refuting suspicion about local node (inc={})", my_incarnation);

            if let Some(mut local) = self.members.get_mut(&name) {
                local.incarnation = my_incarnation;
                local.state = NodeState::Alive;
                local.last_seen = Some(Instant::now());
            }

            self.broadcast_message(GossipMessage::Alive {
                name,
                incarnation: my_incarnation,
            })
            .await;

            return Ok(());
        }

        match self.members.get_mut(&name) {
            Some(mut existing) => {
                if incarnation >= existing.incarnation && existing.state == NodeState::Alive {
                    tracing::info!("Node {} at {} suspected", existing.name, existing.addr);
                    existing.state = NodeState::Suspect;
                    existing.incarnation = incarnation;
                }
            }
            None => {
                tracing::debug!("Suspected node {} doesn't exist", name);
            }
        }

        Ok(())
    }

    async fn handle_alive(&self, name: NodeName, incarnation: u64) -> Result<()> {
        match self.members.get_mut(&name) {
            Some(mut existing) => {
                if incarnation > existing.incarnation {
                    tracing::info!(
                        "Node {} at {} is now Alive (inc={})",
                        existing.name,
                        existing.addr,
                        incarnation
                    );
                    existing.state = NodeState::Alive;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if incarnation == existing.incarnation && existing.state == NodeState::Suspect {
                    tracing::info!(
                        "Node {} at {} successfully refuted suspicion",
                        existing.name,
                        existing.addr,
                    );
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::debug!("Alive message for unknown node {}", name);
            }
        }

        Ok(())
    }

    async fn handle_join(&self, mut member: Member, src: SocketAddr) -> Result<()> {
        if member.name == self.local_member.name {
            return Ok(());
        }

        if member.addr.ip().is_unspecified() {
            member.addr = SocketAddr::new(src.ip(), member.addr.port());
        }

        tracing::info!("Node {} joining cluster at {}", member.name, member.addr);

        member.state = NodeState::Alive;
        member.last_seen = Some(Instant::now());

        self.members.insert(member.name.clone(), member);

        tracing::info!("Cluster size now: {}", self.members.len());

        // The joiner learns the rest of the cluster from our member list.
        self.send_ack(src).await
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.probe_interval);

        loop {
            interval.tick().await;
            let now = Instant::now();

            let mut messages_to_broadcast = Vec::new();

            for mut entry in self.members.iter_mut() {
                let member = entry.value_mut();

                if member.name == self.local_member.name {
                    continue;
                }

                let Some(last_seen) = member.last_seen else {
                    member.last_seen = Some(now);
                    continue;
                };
                let elapsed = now.duration_since(last_seen);

                match member.state {
                    NodeState::Alive if elapsed > self.config.suspect_timeout => {
                        tracing::warn!("Node {} suspected (no contact for {:?})", member.name, elapsed);

                        member.state = NodeState::Suspect;

                        messages_to_broadcast.push(GossipMessage::Suspect {
                            name: member.name.clone(),
                            incarnation: member.incarnation,
                        });
                    }

                    NodeState::Suspect if elapsed > self.config.dead_timeout => {
                        tracing::info!("Node {} declared dead (no contact for {:?})", member.name, elapsed);

                        member.state = NodeState::Dead;
                    }

                    _ => {}
                }
            }

            for msg in messages_to_broadcast {
                self.broadcast_message(msg).await;
            }
        }
    }

    async fn broadcast_message(&self, msg: GossipMessage) {
        if let Ok(encoded) = bincode::serialize(&msg) {
            let targets: Vec<Member> = self
                .members
                .iter()
                .filter(|entry| {
                    entry.value().name != self.local_member.name
                        && entry.value().state == NodeState::Alive
                })
                .map(|entry| entry.value().clone())
                .collect();

            for member in targets {
                if let Err(e) = self.socket.send_to(&encoded, member.addr).await {
                    tracing::warn!("Failed to broadcast to {}: {}", member.name, e);
                }
            }
        }
    }
}

#[async_trait]
impl MembershipLayer for GossipMembership {
    async fn join(&self, seeds: &[String]) -> Result<usize> {
        let msg = GossipMessage::Join {
            member: self.local_member.clone(),
        };
        let encoded = bincode::serialize(&msg)?;

        let mut contacted = 0;
        let mut seeded_by_self = false;
        let mut last_error = None;

        for seed in seeds {
            let Some(addr) = self.seed_addr(seed) else {
                tracing::debug!("Ignoring unparsable seed address {:?}", seed);
                continue;
            };
            if addr == self.local_member.addr {
                seeded_by_self = true;
                continue;
            }

            match self.socket.send_to(&encoded, addr).await {
                Ok(_) => {
                    tracing::debug!("Sent join request to {}", addr);
                    contacted += 1;
                }
                Err(e) => {
                    tracing::debug!("Failed to send join request to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        if contacted > 0 || seeded_by_self || seeds.is_empty() {
            return Ok(contacted);
        }
        match last_error {
            Some(e) => Err(anyhow!("no seed could be contacted: {}", e)),
            None => Err(anyhow!("no usable seed address in {:?}", seeds)),
        }
    }

    fn current_members(&self) -> Vec<Node> {
        self.get_alive_members().iter().map(Member::to_node).collect()
    }

    fn local_node(&self) -> String {
        self.local_member.addr.to_string()
    }
}

fn advertise_addr(config: &MembershipConfig, bound: SocketAddr) -> SocketAddr {
    if let Some(addr) = config.advertise_addr {
        return addr;
    }
    if !bound.ip().is_unspecified() {
        return bound;
    }
    SocketAddr::new(outbound_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)), bound.port())
}

/// Picks the address of the interface a datagram to a public address would
/// leave through. Connecting a UDP socket sends nothing.
fn outbound_ip() -> Option<IpAddr> {
    let probe = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    probe.connect("192.0.2.1:9").ok()?;
    probe.local_addr().ok().map(|addr| addr.ip())
}
