//! Sync Module Tests
//!
//! ## Test Scopes
//! - **Orchestrator**: readiness gating, timeouts, failure isolation and
//!   channel release, against an in-memory transport.
//! - **Server + HTTP transport**: the real endpoints over loopback.

#[cfg(test)]
mod tests {
    use crate::readiness::tracker::ReadinessTracker;
    use crate::sync::handlers::{SyncServerState, sync_router};
    use crate::sync::hook::CommunicationHook;
    use crate::sync::orchestrator::{PeerOutcome, SyncOrchestrator};
    use crate::sync::protocol::{CommunicationAck, ReadinessReply};
    use crate::sync::transport::{HttpTransport, base_url};
    use crate::testing::{FakeMembership, FakeTransport, PeerBehavior};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn orchestrator(transport: &Arc<FakeTransport>, max_in_flight: usize) -> SyncOrchestrator {
        SyncOrchestrator::new(transport.clone(), 7000, max_in_flight)
    }

    fn hosts(hosts: &[&str]) -> Vec<String> {
        hosts.iter().map(|h| h.to_string()).collect()
    }

    // ============================================================
    // ORCHESTRATOR TESTS
    // ============================================================

    #[tokio::test]
    async fn test_ready_peer_gets_probe_then_trigger() {
        let transport = Arc::new(FakeTransport::default().with("10.0.0.2", PeerBehavior::Ready));

        let report = orchestrator(&transport, 4).sync_peers(&hosts(&["10.0.0.2"])).await;

        assert_eq!(report.outcome_for("10.0.0.2"), Some(PeerOutcome::Completed));
        assert_eq!(
            transport.calls_to("10.0.0.2"),
            vec!["open", "probe", "trigger", "close"]
        );
    }

    #[tokio::test]
    async fn test_not_ready_peer_is_never_triggered() {
        let transport = Arc::new(FakeTransport::default().with("10.0.0.3", PeerBehavior::NotReady));

        let report = orchestrator(&transport, 4).sync_peers(&hosts(&["10.0.0.3"])).await;

        assert_eq!(report.outcome_for("10.0.0.3"), Some(PeerOutcome::NotReady));
        assert_eq!(transport.calls_to("10.0.0.3"), vec!["open", "probe", "close"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_times_out_and_next_peer_continues() {
        let transport = Arc::new(
            FakeTransport::default()
                .with("10.0.0.9", PeerBehavior::ProbeHangs(Duration::from_millis(600)))
                .with("10.0.0.10", PeerBehavior::Ready),
        );

        let report = orchestrator(&transport, 1)
            .sync_peers(&hosts(&["10.0.0.9", "10.0.0.10"]))
            .await;

        assert_eq!(report.outcome_for("10.0.0.9"), Some(PeerOutcome::ProbeFailed));
        assert_eq!(transport.calls_to("10.0.0.9"), vec!["open", "probe", "close"]);
        assert_eq!(report.outcome_for("10.0.0.10"), Some(PeerOutcome::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_trigger_times_out_and_channel_is_closed() {
        let transport = Arc::new(
            FakeTransport::default().with("10.0.0.11", PeerBehavior::TriggerHangs(Duration::from_millis(600))),
        );

        let report = orchestrator(&transport, 1).sync_peers(&hosts(&["10.0.0.11"])).await;

        assert_eq!(report.outcome_for("10.0.0.11"), Some(PeerOutcome::TriggerFailed));
        assert_eq!(
            transport.calls_to("10.0.0.11"),
            vec!["open", "probe", "trigger", "close"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_gets_its_own_deadline() {
        // Probe and trigger together exceed one deadline; each alone does not.
        let transport = Arc::new(
            FakeTransport::default()
                .with("10.0.0.12", PeerBehavior::ProbeHangs(Duration::from_millis(400)))
                .with("10.0.0.13", PeerBehavior::TriggerHangs(Duration::from_millis(400))),
        );

        let report = orchestrator(&transport, 1)
            .sync_peers(&hosts(&["10.0.0.12", "10.0.0.13"]))
            .await;

        assert_eq!(report.outcome_for("10.0.0.12"), Some(PeerOutcome::Completed));
        assert_eq!(report.outcome_for("10.0.0.13"), Some(PeerOutcome::Completed));
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_peer() {
        let transport = Arc::new(
            FakeTransport::default()
                .with("10.0.0.1", PeerBehavior::Unreachable)
                .with("10.0.0.2", PeerBehavior::ProbeError)
                .with("10.0.0.3", PeerBehavior::TriggerError)
                .with("10.0.0.4", PeerBehavior::Ready),
        );

        let report = orchestrator(&transport, 2)
            .sync_peers(&hosts(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]))
            .await;

        assert_eq!(report.peers.len(), 4);
        assert_eq!(report.outcome_for("10.0.0.1"), Some(PeerOutcome::DialFailed));
        assert_eq!(report.outcome_for("10.0.0.2"), Some(PeerOutcome::ProbeFailed));
        assert_eq!(report.outcome_for("10.0.0.3"), Some(PeerOutcome::TriggerFailed));
        assert_eq!(report.outcome_for("10.0.0.4"), Some(PeerOutcome::Completed));

        // Every opened channel is closed, whatever happened on it.
        for host in ["10.0.0.2", "10.0.0.3", "10.0.0.4"] {
            assert_eq!(transport.calls_to(host).last(), Some(&"close"), "{} left open", host);
        }
        assert_eq!(transport.calls_to("10.0.0.1"), vec!["open"]);
    }

    #[tokio::test]
    async fn test_sequential_fan_out_keeps_address_order() {
        let transport = Arc::new(FakeTransport::default());

        orchestrator(&transport, 1)
            .sync_peers(&hosts(&["10.0.0.1", "10.0.0.2"]))
            .await;

        let opened: Vec<String> = transport
            .calls()
            .into_iter()
            .filter(|(_, call)| *call == "open")
            .map(|(host, _)| host)
            .collect();
        assert_eq!(opened, hosts(&["10.0.0.1", "10.0.0.2"]));
    }

    // ============================================================
    // PROTOCOL TESTS
    // ============================================================

    #[test]
    fn test_replies_ignore_unknown_fields() {
        let reply: ReadinessReply =
            serde_json::from_str(r#"{"is_ready":true,"load":0.4}"#).unwrap();
        assert!(reply.is_ready);

        let missing: ReadinessReply = serde_json::from_str("{}").unwrap();
        assert!(!missing.is_ready);

        let _ack: CommunicationAck = serde_json::from_str(r#"{"extra":1}"#).unwrap();
    }

    #[test]
    fn test_base_url_brackets_ipv6() {
        assert_eq!(base_url("10.0.0.1", 7000), "http://10.0.0.1:7000");
        assert_eq!(base_url("fe80::1", 7000), "http://[fe80::1]:7000");
    }

    // ============================================================
    // SERVER + HTTP TRANSPORT TESTS
    // ============================================================

    async fn spawn_server(state: SyncServerState) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, sync_router(state)).await.unwrap();
        });
        port
    }

    fn counting_hook(counter: &Arc<AtomicUsize>) -> CommunicationHook {
        let counter = counter.clone();
        CommunicationHook::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_http_handshake_with_ready_peer() {
        let readiness = Arc::new(ReadinessTracker::new());
        readiness.refresh(&FakeMembership::new("127.0.0.1:7946"));
        let exchanges = Arc::new(AtomicUsize::new(0));
        let port = spawn_server(SyncServerState {
            readiness,
            hook: counting_hook(&exchanges),
        })
        .await;

        let orchestrator = SyncOrchestrator::new(Arc::new(HttpTransport::new().unwrap()), port, 1);

        assert_eq!(orchestrator.sync_peer("127.0.0.1").await, PeerOutcome::Completed);
        assert_eq!(orchestrator.sync_peer("127.0.0.1").await, PeerOutcome::Completed);
        assert_eq!(exchanges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_http_handshake_with_unready_peer() {
        let exchanges = Arc::new(AtomicUsize::new(0));
        let port = spawn_server(SyncServerState {
            readiness: Arc::new(ReadinessTracker::new()),
            hook: counting_hook(&exchanges),
        })
        .await;

        let orchestrator = SyncOrchestrator::new(Arc::new(HttpTransport::new().unwrap()), port, 1);

        assert_eq!(orchestrator.sync_peer("127.0.0.1").await, PeerOutcome::NotReady);
        assert_eq!(exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_trigger_refused_when_server_not_ready() {
        let exchanges = Arc::new(AtomicUsize::new(0));
        let port = spawn_server(SyncServerState {
            readiness: Arc::new(ReadinessTracker::new()),
            hook: counting_hook(&exchanges),
        })
        .await;

        let response = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/sync/communicate", port))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_hook_fails_the_trigger() {
        let readiness = Arc::new(ReadinessTracker::new());
        readiness.refresh(&FakeMembership::new("127.0.0.1:7946"));
        let port = spawn_server(SyncServerState {
            readiness,
            hook: CommunicationHook::new(|| async { Err::<(), _>(anyhow::anyhow!("disk full")) }),
        })
        .await;

        let orchestrator = SyncOrchestrator::new(Arc::new(HttpTransport::new().unwrap()), port, 1);

        assert_eq!(orchestrator.sync_peer("127.0.0.1").await, PeerOutcome::TriggerFailed);
    }

    #[tokio::test]
    async fn test_unreachable_peer_fails_probe() {
        // Grab a free port and release it so nothing listens there.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let orchestrator = SyncOrchestrator::new(Arc::new(HttpTransport::new().unwrap()), port, 1);

        assert_eq!(orchestrator.sync_peer("127.0.0.1").await, PeerOutcome::ProbeFailed);
    }
}
