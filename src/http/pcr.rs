//! `/pcr`: static HTML shell for the client-side PCR flipboard widget.
//! No core behavior lives here; the page only pulls in scripts.
use axum::http::header;
use axum::response::IntoResponse;

const PAGE: &str = "<html><head>\
<script src=\"js/jquery.js\"></script>\
<script src=\"js/pcr.js\"></script>\
</head><body>\
<div id=\"flipboard\"></div>\
<div id=\"error\"></div>\
<button id=\"ss_button\">Start</button>\
</body></html>";

pub async fn handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html")], PAGE)
}
