//! Communication Hook
//!
//! The data exchanged when a peer triggers communication is up to the
//! application. It plugs a closure in here; the default does nothing and
//! simply acknowledges.

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for a thread-safe, asynchronous communication step.
pub type CommunicationFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

#[derive(Clone)]
pub struct CommunicationHook {
    handler: CommunicationFn,
}

impl CommunicationHook {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // Box::pin erases the concrete future type so any async closure fits.
        let handler: CommunicationFn =
            Arc::new(move || Box::pin(handler()) as Pin<Box<dyn Future<Output = Result<()>> + Send>>);

        Self { handler }
    }

    pub fn noop() -> Self {
        Self::new(|| async { Ok(()) })
    }

    pub async fn run(&self) -> Result<()> {
        (self.handler)().await
    }
}

impl Default for CommunicationHook {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for CommunicationHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunicationHook").finish_non_exhaustive()
    }
}
