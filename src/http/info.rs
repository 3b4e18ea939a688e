//! `/si`: the HTML report of stream and PID state across every program.
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use std::fmt::Write as _;

use super::AppState;

pub async fn handler(State(state): State<AppState>) -> impl IntoResponse {
    let limits = state.registry.limits();
    let entries = state.registry.all_published();

    let mut html = String::new();
    html.push_str("<html><body>");
    let _ = write!(
        html,
        "<h2>udp2http, support {} udp, {} http per udp</h2><hr>",
        limits.max_programs, limits.max_streams_per_program
    );

    html.push_str("<p>stream information:</p>");
    html.push_str(
        "<table border=\"1\"><tr><th>udp stream</th><th>slot number</th>\
<th>http client</th><th>send/discard bytes</th><th>start time</th></tr>",
    );
    for entry in &entries {
        let guard = entry.state.lock().await;
        for (idx, slot) in guard.slots.running() {
            let Some(remote) = slot.remote else { continue };
            let started_ago = slot
                .start_time
                .map(|t| t.elapsed().as_secs())
                .unwrap_or(0);
            let _ = write!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}/{}</td><td>{}s ago</td></tr>",
                entry.key, idx, remote, slot.send_bytes, slot.discard_bytes, started_ago
            );
        }
    }
    html.push_str("</table>");

    html.push_str("<p>pid information:</p>");
    html.push_str("<table border=\"1\"><tr><th>udp stream</th><th>pid</th></tr>");
    for entry in &entries {
        let nr_streams = entry.state.lock().await.slots.nr_streams;
        if nr_streams == 0 {
            continue;
        }
        let mut pid_info = String::new();
        for (pid, counters) in entry.pid_table.nonzero() {
            let _ = write!(pid_info, "{}:{} ", pid, counters.count());
        }
        let _ = write!(html, "<tr><td>{}</td><td>{}</td></tr>", entry.key, pid_info);
    }
    html.push_str("</table>");
    html.push_str("</body></html>");

    ([(header::CONTENT_TYPE, "text/html")], html)
}
