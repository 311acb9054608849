//! In-memory stand-ins for the membership, resolver and transport seams.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::discovery::resolver::Resolver;
use crate::error::CallError;
use crate::membership::layer::MembershipLayer;
use crate::membership::types::Node;
use crate::sync::transport::{SyncChannel, SyncTransport};

#[derive(Default)]
pub struct FakeMembership {
    pub members: Mutex<Vec<Node>>,
    pub local: Mutex<String>,
    pub joins: Mutex<Vec<Vec<String>>>,
    pub fail_join: AtomicBool,
    /// Number of upcoming `current_members` calls that panic.
    pub panics_left: AtomicUsize,
}

impl FakeMembership {
    pub fn new(local: &str) -> Self {
        Self {
            local: Mutex::new(local.to_string()),
            ..Self::default()
        }
    }

    pub fn set_members(&self, members: &[(&str, &str)]) {
        *self.members.lock().unwrap() = members
            .iter()
            .map(|(name, address)| Node::new(*name, *address))
            .collect();
    }

    pub fn joins(&self) -> Vec<Vec<String>> {
        self.joins.lock().unwrap().clone()
    }
}

#[async_trait]
impl MembershipLayer for FakeMembership {
    async fn join(&self, seeds: &[String]) -> Result<usize> {
        self.joins.lock().unwrap().push(seeds.to_vec());
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(anyhow!("join refused"));
        }
        Ok(seeds.len())
    }

    fn current_members(&self) -> Vec<Node> {
        let should_panic = self
            .panics_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_panic {
            panic!("membership snapshot unavailable");
        }
        self.members.lock().unwrap().clone()
    }

    fn local_node(&self) -> String {
        self.local.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeResolver {
    answers: HashMap<String, Result<Vec<IpAddr>, String>>,
}

impl FakeResolver {
    pub fn with(mut self, name: &str, addresses: &[&str]) -> Self {
        let ips = addresses.iter().map(|a| a.parse().unwrap()).collect();
        self.answers.insert(name.to_string(), Ok(ips));
        self
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.answers
            .insert(name.to_string(), Err(format!("no such host: {}", name)));
        self
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>> {
        match self.answers.get(name) {
            Some(Ok(ips)) => Ok(ips.clone()),
            Some(Err(e)) => Err(anyhow!(e.clone())),
            None => Err(anyhow!("no such host: {}", name)),
        }
    }
}

/// How a fake peer behaves when contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    Ready,
    NotReady,
    Unreachable,
    ProbeError,
    ProbeHangs(Duration),
    TriggerError,
    TriggerHangs(Duration),
}

/// Records every call as `(host, "open" | "probe" | "trigger" | "close")`.
#[derive(Default)]
pub struct FakeTransport {
    behaviors: Mutex<HashMap<String, PeerBehavior>>,
    calls: std::sync::Arc<Mutex<Vec<(String, &'static str)>>>,
}

impl FakeTransport {
    pub fn with(self, host: &str, behavior: PeerBehavior) -> Self {
        self.behaviors
            .lock()
            .unwrap()
            .insert(host.to_string(), behavior);
        self
    }

    pub fn calls(&self) -> Vec<(String, &'static str)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, host: &str) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter(|(h, _)| h == host)
            .map(|(_, call)| call)
            .collect()
    }
}

#[async_trait]
impl SyncTransport for FakeTransport {
    async fn open(&self, host: &str, _port: u16) -> Result<Box<dyn SyncChannel>, CallError> {
        self.calls.lock().unwrap().push((host.to_string(), "open"));

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(host)
            .copied()
            .unwrap_or(PeerBehavior::Ready);

        if behavior == PeerBehavior::Unreachable {
            return Err(CallError::Dial {
                addr: host.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        Ok(Box::new(FakeChannel {
            host: host.to_string(),
            behavior,
            calls: self.calls.clone(),
        }))
    }
}

struct FakeChannel {
    host: String,
    behavior: PeerBehavior,
    calls: std::sync::Arc<Mutex<Vec<(String, &'static str)>>>,
}

impl FakeChannel {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push((self.host.clone(), call));
    }
}

#[async_trait]
impl SyncChannel for FakeChannel {
    async fn probe_readiness(&mut self, _timeout: Duration) -> Result<bool, CallError> {
        self.record("probe");
        match self.behavior {
            PeerBehavior::NotReady => Ok(false),
            PeerBehavior::ProbeError => Err(CallError::Status(500)),
            PeerBehavior::ProbeHangs(delay) => {
                tokio::time::sleep(delay).await;
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    async fn trigger_communication(&mut self, _timeout: Duration) -> Result<(), CallError> {
        self.record("trigger");
        match self.behavior {
            PeerBehavior::TriggerError => Err(CallError::Transport("connection reset".to_string())),
            PeerBehavior::TriggerHangs(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), CallError> {
        self.record("close");
        Ok(())
    }
}
