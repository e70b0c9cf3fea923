//! HTTP ingress in front of the engine's router.

mod http;
mod payload;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use ingest_engine::{DeviceStatusBoard, Engine};

pub use payload::{Accepted, BatchRequest, ReadingError, SensorReading};

/// The `[ingress]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    /// Upper bound on items in one batch request.
    pub max_batch_records: usize,
    /// Values strictly above this raise an alert and go to the high lane.
    pub alert_threshold: f64,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            max_batch_records: 1000,
            alert_threshold: ingest_engine::status::DEFAULT_ALERT_THRESHOLD,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    board: Arc<DeviceStatusBoard>,
    ingress: IngressConfig,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, board: Arc<DeviceStatusBoard>, ingress: IngressConfig) -> Self {
        Self {
            engine,
            board,
            ingress,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(http::handle_health))
        .route("/api/sensor-data", post(http::handle_sensor_data))
        .route("/api/batch-sensor-data", post(http::handle_batch_sensor_data))
        .route("/api/stats", get(http::handle_stats))
        .route("/api/devices/{device_id}", get(http::handle_device))
        .with_state(state);
    with_http_layers(routes)
}

/// Request logging and panic recovery around every route of `router`.
///
/// A panicking handler answers 500 instead of dropping the connection.
pub fn with_http_layers(router: Router) -> Router {
    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request| {
            let user_agent = request
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            tracing::info_span!(
                "http",
                method = %request.method(),
                path = %request.uri().path(),
                user_agent
            )
        })
        .on_request(())
        .on_response(|response: &Response, latency: Duration, _span: &Span| {
            tracing::info!(
                status = response.status().as_u16(),
                duration_ms = latency.as_secs_f64() * 1000.0,
                "request served"
            );
        });

    // Last layer is outermost: panics unwinding out of the traced handler land here.
    router.layer(trace).layer(CatchPanicLayer::custom(handle_panic))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}

/// Serve the ingress API until `shutdown` is cancelled.
pub async fn run(port: u16, state: AppState, shutdown: CancellationToken) -> Result<(), String> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| format!("bind api :{port}: {e}"))?;
    tracing::info!(port, "ingress API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    tracing::info!("ingress API stopped");
    Ok(())
}
