//! `/ss?udp=HOST:PORT`: the per-PID rate plot, rendered as inline SVG.
//!
//! The "base time" label is a history depth rather than a wall-clock
//! timestamp, since nothing downstream parses it.
use std::fmt::Write as _;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use super::{AppState, FlowQuery};
use crate::ts::RATE_HISTORY_LEN;

const CONTENT_TYPE: &str = "text/xml";

pub async fn handler(State(state): State<AppState>, Query(query): Query<FlowQuery>) -> Response {
    let headers = [(header::CONTENT_TYPE, CONTENT_TYPE)];

    let entry = query
        .udp
        .as_deref()
        .and_then(|udp| state.registry.get(udp))
        .or_else(|| state.registry.get_first());

    let Some(entry) = entry else {
        return (StatusCode::OK, headers, Vec::<u8>::new()).into_response();
    };

    let rate_index = entry.pid_table.rate_index() as usize;
    if rate_index <= 2 {
        state.registry.put(&entry);
        return (StatusCode::OK, headers, Vec::<u8>::new()).into_response();
    }

    let mut svg = String::with_capacity(4096);
    svg.push_str(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><!DOCTYPE svg>\
<svg width=\"800px\" height=\"600px\" xmlns=\"http://www.w3.org/2000/svg\"><g>",
    );
    let _ = write!(
        svg,
        "<text font-size=\"16\" x=\"10\" y=\"20\">base time: {rate_index}s of history</text>"
    );

    let mut y: i32 = 60;
    for (pid, counters) in entry.pid_table.nonzero() {
        let _ = write!(
            svg,
            "<text font-size=\"16\" x=\"5\" y=\"{}\">{}</text>",
            y - 2,
            pid
        );
        let _ = write!(
            svg,
            "<rect x=\"40\" y=\"{y}\" width=\"600\" height=\"2\" style=\"fill:#00ff00\" />"
        );

        let mut x: i32 = 50;
        let mut rate_sum: u64 = 0;
        for idx in 0..rate_index {
            let r = counters.rate_at(idx) as i32;
            rate_sum += r as u64;
            if r >= 60 {
                let z = r / 60;
                let z_style = if z >= 60 {
                    "style=\"fill:#FF0000\""
                } else {
                    "style=\"fill:#880000\""
                };
                let _ = write!(
                    svg,
                    "<rect x=\"{}\" y=\"{}\" width=\"3\" height=\"{}\" style=\"fill:#AAAAAA\" />",
                    x,
                    y - r % 60,
                    r % 60
                );
                let _ = write!(
                    svg,
                    "<rect x=\"{}\" y=\"{}\" width=\"1\" height=\"{}\" {} />",
                    x + 1,
                    y - z % 60,
                    z % 60,
                    z_style
                );
            } else {
                let _ = write!(
                    svg,
                    "<rect x=\"{x}\" y=\"{}\" width=\"3\" height=\"{r}\" />",
                    y - r
                );
            }
            x += 5;
        }
        let rate_avg = rate_sum / rate_index as u64;
        let _ = write!(
            svg,
            "<text font-size=\"16\" x=\"{}\" y=\"{}\">avg={} bps</text>",
            50 + 5 * RATE_HISTORY_LEN as i32,
            y - 2,
            rate_avg * 188 * 8
        );

        y += 60 + 10;
    }
    svg.push_str("</g></svg>");

    state.registry.put(&entry);

    (StatusCode::OK, headers, svg).into_response()
}
