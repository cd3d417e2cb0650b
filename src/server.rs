// src/server.rs
// =============================================================================
// HTTP API in front of the analyzer.
//
// Routes:
// - GET  /         small HTML form for trying the analyzer from a browser
// - POST /analyze  form field `url`, answers with the AnalysisResult as JSON
// - GET  /health   liveness plus uptime
// - GET  /metrics  analyzer counters and cache size
//
// The analysis JSON is returned for failures too. Only the status code
// changes, based on the error code (see status_for).
//
// Middleware on every route (see with_middleware):
// - security headers (nosniff, frame DENY, XSS protection, referrer policy)
// - a 30s request timeout answered with 408
// - panic recovery answered with 500
// - permissive CORS and request tracing
//
// If a client disconnects mid-analysis, axum drops the handler future. That
// drops the scheduler's JoinSet, which aborts every in-flight probe.
// =============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::{Form, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::analyzer::{AnalysisResult, Analyzer, MetricsSnapshot};
use crate::error::AnalysisError;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SECURITY_HEADERS: [(HeaderName, &str); 4] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
];

#[derive(Clone)]
pub struct AppState {
    analyzer: Arc<Analyzer>,
    started: Instant,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeForm {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    analyzer: MetricsSnapshot,
    cache_entries: u64,
}

pub fn router(analyzer: Arc<Analyzer>) -> Router {
    let state = AppState {
        analyzer,
        started: Instant::now(),
    };

    let routes = Router::new()
        .route("/", get(index_handler))
        .route("/analyze", post(analyze_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    with_middleware(routes, REQUEST_TIMEOUT)
}

// Later layers wrap earlier ones, so the security headers also land on the
// 408 and 500 responses produced by the timeout and panic layers
pub fn with_middleware(routes: Router, request_timeout: Duration) -> Router {
    let mut app = routes
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(request_timeout));

    for (name, value) in SECURITY_HEADERS {
        app = app.layer(SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value)));
    }

    app.layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http())
}

// Binds, serves until Ctrl-C, then drains in-flight requests
pub async fn serve(addr: SocketAddr, analyzer: Arc<Analyzer>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "page analyzer listening");

    axum::serve(listener, router(analyzer))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        // Without a signal handler there is no way to be told to stop
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn analyze_handler(State(state): State<AppState>, Form(form): Form<AnalyzeForm>) -> Response {
    let Some(url) = form.url.filter(|url| !url.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "URL parameter is required").into_response();
    };

    let result = state.analyzer.analyze(&url).await;
    (status_for(&result), Json(result)).into_response()
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        analyzer: state.analyzer.metrics(),
        cache_entries: state.analyzer.cache().len(),
    })
}

// HTTP status for an analysis outcome.
// An upstream 4xx is the caller's problem (bad URL); an upstream 5xx is a
// bad gateway.
pub fn status_for(result: &AnalysisResult) -> StatusCode {
    let Some(error) = &result.error else {
        return StatusCode::OK;
    };

    match error {
        AnalysisError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
        AnalysisError::Http { status, .. } if (400..500).contains(status) => StatusCode::BAD_REQUEST,
        AnalysisError::Http { status, .. } if *status >= 500 => StatusCode::BAD_GATEWAY,
        AnalysisError::Network { .. } | AnalysisError::CircuitOpen { .. } => StatusCode::BAD_GATEWAY,
        AnalysisError::Parse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AnalysisError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
        AnalysisError::Http { .. } | AnalysisError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Web Page Analyzer</title>
</head>
<body>
    <h1>Web Page Analyzer</h1>
    <p>Analyze web pages for HTML structure, content, and link health</p>
    <form id="analyzeForm">
        <label for="url">Enter URL to analyze</label>
        <input type="url" id="url" name="url" required placeholder="https://example.com">
        <button type="submit">Analyze Page</button>
    </form>
    <pre id="results"></pre>
    <script>
        document.getElementById("analyzeForm").addEventListener("submit", async (event) => {
            event.preventDefault();
            const results = document.getElementById("results");
            results.textContent = "Analyzing...";
            const body = new URLSearchParams(new FormData(event.target));
            const response = await fetch("/analyze", { method: "POST", body });
            const text = await response.text();
            try {
                results.textContent = JSON.stringify(JSON.parse(text), null, 2);
            } catch {
                results.textContent = text;
            }
        });
    </script>
</body>
</html>"#;
