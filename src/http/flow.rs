//! `/start_flow` and `/stop_flow`: let a browser keep a program entry
//! alive (or release it) without opening a streaming slot.
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use tracing::warn;

use super::{find_or_create, jsonp_wrap, AppState, FlowQuery};

const CONTENT_TYPE: &str = "application/x-javascript";

pub async fn start_flow(State(state): State<AppState>, Query(query): Query<FlowQuery>) -> impl IntoResponse {
    match query.udp.as_deref() {
        Some(udp) => match find_or_create(&state, udp).await {
            Ok(entry) => {
                entry.inc_users().await;
                state.registry.put(&entry);
            }
            Err(e) => {
                warn!(udp_addr = %udp, error = %e, "start_flow could not resolve program entry");
            }
        },
        None => warn!("start_flow request missing udp parameter"),
    }

    (
        [(header::CONTENT_TYPE, CONTENT_TYPE), (header::CACHE_CONTROL, "no-cache")],
        jsonp_wrap(query.callback.as_deref(), ""),
    )
}

pub async fn stop_flow(State(state): State<AppState>, Query(query): Query<FlowQuery>) -> impl IntoResponse {
    match query.udp.as_deref() {
        Some(udp) => {
            if let Some(entry) = state.registry.get(udp) {
                entry.dec_users().await;
                state.registry.put(&entry);
            }
        }
        None => warn!("stop_flow request missing udp parameter"),
    }

    (
        [(header::CONTENT_TYPE, CONTENT_TYPE), (header::CACHE_CONTROL, "no-cache")],
        jsonp_wrap(query.callback.as_deref(), ""),
    )
}
