use axum::{Json, Router, extract::Extension, http::StatusCode, routing::get, routing::post};
use std::sync::Arc;

use super::hook::CommunicationHook;
use super::protocol::{CommunicationAck, ENDPOINT_COMMUNICATE, ENDPOINT_READY, ReadinessReply};
use crate::readiness::tracker::ReadinessTracker;

/// What the sync endpoints need to answer peers.
#[derive(Clone)]
pub struct SyncServerState {
    pub readiness: Arc<ReadinessTracker>,
    pub hook: CommunicationHook,
}

pub fn sync_router(state: SyncServerState) -> Router {
    Router::new()
        .route(ENDPOINT_READY, get(handle_readiness_probe))
        .route(ENDPOINT_COMMUNICATE, post(handle_communication_trigger))
        .layer(Extension(state))
}

pub async fn handle_readiness_probe(
    Extension(state): Extension<SyncServerState>,
) -> (StatusCode, Json<ReadinessReply>) {
    let is_ready = state.readiness.is_ready();
    tracing::trace!("Answering readiness probe: {}", is_ready);

    (StatusCode::OK, Json(ReadinessReply { is_ready }))
}

/// The request body is ignored, so callers may send anything or nothing.
pub async fn handle_communication_trigger(
    Extension(state): Extension<SyncServerState>,
) -> (StatusCode, Json<CommunicationAck>) {
    // Readiness may have changed since the peer probed it.
    if !state.readiness.is_ready() {
        tracing::debug!("Communication triggered while not ready, refusing");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(CommunicationAck::default()));
    }

    match state.hook.run().await {
        Ok(()) => (StatusCode::OK, Json(CommunicationAck::default())),
        Err(e) => {
            tracing::error!("Communication step failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CommunicationAck::default()),
            )
        }
    }
}
