use clap::Parser;
use peer_sync::instance::config::SyncConfig;
use peer_sync::instance::scheduler::SyncInstance;
use peer_sync::membership::config::MembershipConfig;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "peer-sync",
    about = "Keeps service replicas aware of each other and synchronizes ready peers"
)]
struct Args {
    /// TCP port of the sync endpoints; must be the same on every instance.
    #[arg(long, env = "PEER_SYNC_PORT", default_value_t = 1010)]
    sync_port: u16,

    /// Service name resolved every tick to find peers (repeatable or comma separated).
    #[arg(long = "service", env = "PEER_SYNC_SERVICES", value_delimiter = ',')]
    services: Vec<String>,

    /// UDP address of the gossip socket.
    #[arg(long, env = "PEER_SYNC_BIND", default_value = "0.0.0.0:7946")]
    bind: SocketAddr,

    /// Gossip address announced to peers, when the bind address is not reachable as is.
    #[arg(long, env = "PEER_SYNC_ADVERTISE")]
    advertise: Option<SocketAddr>,

    /// Node name; defaults to $HOSTNAME, then to a random UUID.
    #[arg(long, env = "PEER_SYNC_NODE_NAME")]
    node_name: Option<String>,

    #[arg(long, env = "PEER_SYNC_TICK_MS", default_value_t = 1000)]
    tick_ms: u64,

    /// Peers handshaked concurrently per tick.
    #[arg(long, env = "PEER_SYNC_MAX_IN_FLIGHT", default_value_t = 8)]
    max_in_flight: usize,

    /// Use the faster-failing gossip timings meant for containers on one host.
    #[arg(long, env = "PEER_SYNC_LOCAL_PROFILE")]
    local_profile: bool,

    #[arg(long, env = "PEER_SYNC_LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let mut membership = if args.local_profile {
        MembershipConfig::local()
    } else {
        MembershipConfig::default()
    }
    .with_bind_addr(args.bind);
    membership.advertise_addr = args.advertise;
    if let Some(name) = args.node_name {
        membership = membership.with_node_name(name);
    }

    if args.services.is_empty() {
        tracing::info!("No service names given, waiting to be joined by peers");
    } else {
        tracing::info!("Discovering peers through: {:?}", args.services);
    }

    let config = SyncConfig::new(args.sync_port, args.services)
        .with_membership(membership)
        .with_tick_interval(Duration::from_millis(args.tick_ms))
        .with_max_in_flight(args.max_in_flight);

    // 1. Membership, discovery and the first join:
    let instance = SyncInstance::init(config).await?;

    // 2. Supervised tick loop:
    let _supervisor = instance.start();

    // 3. Stats reporter:
    let stats_instance = instance.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let local = stats_instance.readiness().snapshot();
            let live = stats_instance.membership().current_members();
            tracing::info!(
                "Cluster stats: {} live, {} known, state={:?}, ready={} ({})",
                live.len(),
                stats_instance.registry().len(),
                stats_instance.state(),
                local.is_ready,
                local.self_address
            );
            for node in live {
                tracing::debug!("  - {} at {}", node.name, node.address);
            }
        }
    });

    // 4. Sync server:
    let sync_addr = SocketAddr::from(([0, 0, 0, 0], args.sync_port));
    let listener = tokio::net::TcpListener::bind(sync_addr).await?;

    tracing::info!("Press Ctrl+C to shutdown");

    tokio::select! {
        result = instance.serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
