//! Viewer page with JSON API endpoints
//!
//! The page embeds the camera stream with an `<img>` element and reports its
//! load and error events back here, so the browser-rendered stream recovers
//! through the same [`StreamViewer`](crate::stream::StreamViewer) policy as
//! the native attacher.
//!
//! The device endpoints are proxied under their own paths, so a page served
//! with an empty base reaches the device through this origin.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::endpoints::{health_url, stream_url, HEALTH_PATH, STREAM_PATH};
use crate::viewer::{Viewer, ViewerStatus};

/// Content type of the camera stream when the device does not name one
const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Dashboard application state
#[derive(Clone)]
pub struct DashboardState {
    pub viewer: Arc<Viewer>,
}

/// Body of `PUT /api/base` and response of `GET /api/base`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseAddress {
    pub base: String,
}

/// Attach result reported by the page for the stream reference it loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachReport {
    pub url: String,
}

/// Build the dashboard axum router
pub fn build_router(viewer: Arc<Viewer>) -> Router {
    let dashboard_state = DashboardState { viewer };

    Router::new()
        .route("/", get(index_handler))
        .route("/api/status", get(status_handler))
        .route("/api/base", get(get_base_handler).put(put_base_handler))
        .route("/api/stream/error", post(stream_error_handler))
        .route("/api/stream/load", post(stream_load_handler))
        .route("/health", get(health_handler))
        .route(HEALTH_PATH, get(proxy_health_handler))
        .route(STREAM_PATH, get(proxy_stream_handler))
        .with_state(dashboard_state)
}

async fn index_handler(State(dashboard): State<DashboardState>) -> impl IntoResponse {
    let status = dashboard.viewer.status();
    let initial = serde_json::to_string(&status)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/");

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Camera Viewer</title>
</head>
<body style="font-family: system-ui, sans-serif; max-width: 960px; margin: 0 auto; padding: 1rem;">
    <header style="display: flex; align-items: center; gap: 12px; margin-bottom: 16px;">
        <h1 style="margin: 0;">Camera Viewer</h1>
        <span id="health-dot" style="width: 10px; height: 10px; border-radius: 50%; display: inline-block; background: #e74c3c;"></span>
        <small id="last-check" style="color: #666;">…</small>
    </header>
    <label style="display: block; margin-bottom: 16px;">
        <div style="font-size: 12px; color: #666; margin-bottom: 6px;">API Base URL (empty = same origin)</div>
        <input id="base" placeholder="http://192.168.4.1:8000"
            style="width: 100%; padding: 10px 12px; border: 1px solid #ddd; border-radius: 8px; font-family: monospace;">
    </label>
    <section style="margin-bottom: 8px;">
        <div style="font-size: 12px; color: #666;">MJPEG stream</div>
        <code id="stream-url" style="font-size: 12px;"></code>
    </section>
    <div style="width: 100%; background: #111; border-radius: 12px; overflow: hidden; border: 1px solid #222;">
        <img id="stream" alt="Camera stream" style="width: 100%; display: block;">
        <div id="stream-failed" style="display: none; color: #fff; padding: 20px;">
            Unable to display the stream, retrying. Check that:
            <ul>
                <li>the camera service is running</li>
                <li>the base URL is correct</li>
                <li>the camera is detected</li>
            </ul>
        </div>
    </div>
    <script>
        const img = document.getElementById('stream');
        const input = document.getElementById('base');

        function render(s) {{
            const dot = document.getElementById('health-dot');
            dot.style.background = s.health.ok ? '#2ecc71' : '#e74c3c';
            dot.title = s.health.ok ? 'API OK' : 'API unavailable';
            document.getElementById('last-check').textContent =
                s.health.last_checked_at === null
                    ? '…'
                    : 'Last check: ' + new Date(s.health.last_checked_at).toLocaleTimeString();
            document.getElementById('stream-url').textContent = s.stream.url;
            if (document.activeElement !== input) input.value = s.base;
            if (img.getAttribute('src') !== s.stream.url) img.setAttribute('src', s.stream.url);
            img.style.display = s.stream.failed ? 'none' : 'block';
            document.getElementById('stream-failed').style.display = s.stream.failed ? 'block' : 'none';
        }}

        function post(path, body, method) {{
            return fetch(path, {{
                method: method || 'POST',
                headers: {{ 'Content-Type': 'application/json' }},
                body: JSON.stringify(body),
            }}).then(r => r.json());
        }}

        function refresh() {{
            fetch('/api/status').then(r => r.json()).then(render);
        }}

        img.addEventListener('error', () => post('/api/stream/error', {{ url: img.getAttribute('src') }}).then(render));
        img.addEventListener('load', () => post('/api/stream/load', {{ url: img.getAttribute('src') }}).then(render));
        input.addEventListener('change', () => post('/api/base', {{ base: input.value }}, 'PUT').then(refresh));

        render({initial});
        setInterval(refresh, 5000);
    </script>
</body>
</html>"#,
        initial = initial,
    );

    Html(html)
}

async fn status_handler(State(dashboard): State<DashboardState>) -> Json<ViewerStatus> {
    Json(dashboard.viewer.status())
}

async fn get_base_handler(State(dashboard): State<DashboardState>) -> Json<BaseAddress> {
    Json(BaseAddress {
        base: dashboard.viewer.base(),
    })
}

async fn put_base_handler(
    State(dashboard): State<DashboardState>,
    Json(request): Json<BaseAddress>,
) -> Json<BaseAddress> {
    let base = dashboard.viewer.set_base(&request.base);
    Json(BaseAddress { base })
}

async fn stream_error_handler(
    State(dashboard): State<DashboardState>,
    Json(report): Json<AttachReport>,
) -> Json<ViewerStatus> {
    report_attach(&dashboard.viewer, &report.url, false);
    Json(dashboard.viewer.status())
}

async fn stream_load_handler(
    State(dashboard): State<DashboardState>,
    Json(report): Json<AttachReport>,
) -> Json<ViewerStatus> {
    report_attach(&dashboard.viewer, &report.url, true);
    Json(dashboard.viewer.status())
}

/// Apply a page-reported result. A failure is retried at once: the page
/// picks up the rotated reference from the returned status.
fn report_attach(viewer: &Viewer, url: &str, success: bool) {
    let stream = viewer.stream();
    let Some(attempt) = stream.current_attempt() else {
        return;
    };
    if attempt.url != url {
        tracing::debug!("Page reported result for stale stream {}", url);
        return;
    }
    if stream.on_attach_result(&attempt, success) && !success {
        stream.retry(attempt.generation);
    }
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

/// Forward the device's health answer; transport failures become 502
async fn proxy_health_handler(State(dashboard): State<DashboardState>) -> Response {
    let url = health_url(&dashboard.viewer.device_base());
    let status = match dashboard.viewer.http().get_uncached(&url).await {
        Ok(response) => StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY),
        Err(e) => {
            tracing::debug!("Proxying {} failed: {}", url, e);
            StatusCode::BAD_GATEWAY
        }
    };
    (status, [(header::CACHE_CONTROL, "no-store")]).into_response()
}

/// Relay the device's stream chunk by chunk
async fn proxy_stream_handler(State(dashboard): State<DashboardState>) -> Response {
    let url = stream_url(&dashboard.viewer.device_base());
    let response = match dashboard.viewer.http().open_stream(&url).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("Proxying {} failed: {}", url, e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    if !status.is_success() {
        return status.into_response();
    }

    let content_type = response
        .content_type
        .unwrap_or_else(|| MJPEG_CONTENT_TYPE.to_string());
    let chunks = futures::stream::unfold(Some(response.body), |body| async move {
        let mut body = body?;
        match body.next_chunk().await {
            Ok(Some(chunk)) => Some((Ok(chunk), Some(body))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    });

    (
        status,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        Body::from_stream(chunks),
    )
        .into_response()
}
