//! `/s?udp=HOST:PORT`: the VLC-facing raw MPEG-TS stream.
use std::net::SocketAddr;

use axum::body::StreamBody;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use super::{find_or_create, AppState, FlowQuery};

const CONTENT_TYPE: &str = "application/octet-stream";

/// Resolve or create the program entry, admit a slot, and stream its
/// channel as the response body until it closes.
///
/// Any failure along the way (missing `udp`, capacity exhausted, bind
/// failure) falls back to a 200 response with an empty body, since a
/// streaming client has no other channel to be told anything on.
pub async fn handler(
    State(state): State<AppState>,
    Query(query): Query<FlowQuery>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Response {
    let headers = [
        (header::CONTENT_TYPE, CONTENT_TYPE),
        (header::CACHE_CONTROL, "no-cache"),
    ];

    let Some(udp) = query.udp else {
        warn!("/s request missing udp parameter");
        return (StatusCode::OK, headers, Vec::<u8>::new()).into_response();
    };

    let entry = match find_or_create(&state, &udp).await {
        Ok(entry) => entry,
        Err(e) => {
            warn!(udp_addr = %udp, error = %e, "/s could not resolve program entry");
            return (StatusCode::OK, headers, Vec::<u8>::new()).into_response();
        }
    };

    let admitted = {
        let mut guard = entry.state.lock().await;
        guard.slots.add_stream(remote)
    };
    state.registry.put(&entry);

    let Some((idx, rx)) = admitted else {
        warn!(udp_addr = %udp, "slot table full, refusing stream");
        return (StatusCode::OK, headers, Vec::<u8>::new()).into_response();
    };

    info!(udp_addr = %udp, slot = idx, remote = %remote, "stream admitted");

    let stream = ReceiverStream::new(rx).map(Ok::<_, std::io::Error>);
    let body = StreamBody::new(stream);
    (StatusCode::OK, headers, body).into_response()
}
