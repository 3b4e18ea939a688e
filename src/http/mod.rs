//! The HTTP surface: axum routes translating requests into registry/slot
//! operations. Routing, query extraction, and response bodies are axum's
//! job; this module only decides what to do with the result.
pub mod flow;
pub mod info;
pub mod pcr;
pub mod stream;
pub mod svg;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::entry::ProgramEntry;
use crate::registry::{ProgramRegistry, RegistryError};
use crate::worker;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProgramRegistry>,
    pub shutdown: CancellationToken,
    /// Tracks every spawned ingest worker so `main` can join them on
    /// shutdown instead of leaking detached tasks.
    pub workers: Arc<AsyncMutex<JoinSet<()>>>,
}

/// `udp`/`callback` query parameters shared by every streaming and
/// control URI.
#[derive(Debug, Deserialize, Default)]
pub struct FlowQuery {
    pub udp: Option<String>,
    pub callback: Option<String>,
}

#[derive(Debug, Error)]
pub enum FindError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("program entry init failed: {0}")]
    Init(#[from] anyhow::Error),
}

/// Resolve `key` to a live, published program entry, creating one on
/// demand: an existing entry is looked up and its refcount bumped; a
/// missing one is reserved, built, and published, with the reservation
/// released again on failure.
pub async fn find_or_create(state: &AppState, key: &str) -> Result<Arc<ProgramEntry>, FindError> {
    if let Some(entry) = state.registry.get(key) {
        return Ok(entry);
    }

    match state.registry.reserve(key) {
        Ok(()) => {}
        Err(RegistryError::AlreadyExists(_)) => {
            // Lost a race with another handler resolving the same key;
            // the winner has since published or is about to.
            return state
                .registry
                .get(key)
                .ok_or_else(|| FindError::Registry(RegistryError::AlreadyExists(key.to_string())));
        }
        Err(e) => return Err(e.into()),
    }

    match ProgramEntry::init(key, state.registry.limits()).await {
        Ok(entry) => {
            let entry = Arc::new(entry);
            state.registry.publish(key, entry.clone());
            state
                .workers
                .lock()
                .await
                .spawn(worker::run(entry.clone(), state.registry.clone(), state.shutdown.clone()));
            info!(udp_addr = %key, "program entry created");
            Ok(entry)
        }
        Err(e) => {
            state.registry.release_reserved(key);
            warn!(udp_addr = %key, error = %e, "program entry init failed");
            Err(e.into())
        }
    }
}

/// Wrap `body` as `callback(body)` when a non-empty `callback` query
/// parameter is present, otherwise pass it through unchanged.
pub fn jsonp_wrap(callback: Option<&str>, body: &str) -> String {
    match callback {
        Some(cb) if !cb.is_empty() => format!("{cb}({body})"),
        _ => body.to_string(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/s", get(stream::handler))
        .route("/si", get(info::handler))
        .route("/ss", get(svg::handler))
        .route("/pcr", get(pcr::handler))
        .route("/start_flow", get(flow::start_flow))
        .route("/stop_flow", get(flow::stop_flow))
        .with_state(state)
}
