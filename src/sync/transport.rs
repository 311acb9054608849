//! Client side of the sync RPC.
//!
//! A [`SyncChannel`] is opened per peer per tick and closed before the
//! orchestrator moves on. [`HttpTransport`] speaks the JSON-over-HTTP protocol
//! served by [`super::handlers`].

use async_trait::async_trait;
use std::time::Duration;

use super::protocol::{CommunicationAck, ENDPOINT_COMMUNICATE, ENDPOINT_READY, ReadinessReply};
use crate::error::CallError;

#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn open(&self, host: &str, port: u16) -> Result<Box<dyn SyncChannel>, CallError>;
}

#[async_trait]
pub trait SyncChannel: Send {
    /// Asks the peer whether it is ready to exchange data.
    async fn probe_readiness(&mut self, timeout: Duration) -> Result<bool, CallError>;

    /// Asks the peer to run its communication step.
    async fn trigger_communication(&mut self, timeout: Duration) -> Result<(), CallError>;

    async fn close(self: Box<Self>) -> Result<(), CallError>;
}

pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, CallError> {
        // Channels are per peer per tick; no connection outlives its channel.
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| CallError::Transport(e.to_string()))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn open(&self, host: &str, port: u16) -> Result<Box<dyn SyncChannel>, CallError> {
        let base_url = base_url(host, port);
        reqwest::Url::parse(&base_url).map_err(|e| CallError::Dial {
            addr: format!("{}:{}", host, port),
            reason: e.to_string(),
        })?;

        Ok(Box::new(HttpChannel {
            http_client: self.http_client.clone(),
            base_url,
        }))
    }
}

struct HttpChannel {
    http_client: reqwest::Client,
    base_url: String,
}

#[async_trait]
impl SyncChannel for HttpChannel {
    async fn probe_readiness(&mut self, timeout: Duration) -> Result<bool, CallError> {
        let response = self
            .http_client
            .get(format!("{}{}", self.base_url, ENDPOINT_READY))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?
            .error_for_status()?;

        let reply: ReadinessReply = response.json().await.map_err(|e| classify(e, timeout))?;
        Ok(reply.is_ready)
    }

    async fn trigger_communication(&mut self, timeout: Duration) -> Result<(), CallError> {
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, ENDPOINT_COMMUNICATE))
            .json(&CommunicationAck::default())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?
            .error_for_status()?;

        // The body is an empty acknowledgment; reading it completes the exchange.
        let _ack: CommunicationAck = response.json().await.map_err(|e| classify(e, timeout))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), CallError> {
        tracing::trace!("Closed sync channel to {}", self.base_url);
        Ok(())
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> CallError {
    if e.is_timeout() {
        CallError::Timeout(timeout)
    } else {
        CallError::from(e)
    }
}

pub(crate) fn base_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{}]:{}", host, port)
    } else {
        format!("http://{}:{}", host, port)
    }
}
