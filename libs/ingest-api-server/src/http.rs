use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;

use ingest_api::Lane;
use ingest_engine::{BatchWriteError, LaneSnapshot, RouterError};

use crate::AppState;
use crate::payload::{BatchRequest, SensorReading};

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ═══════════════════════════════════════════════════════════════
//  GET /health
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_health(State(state): State<AppState>) -> Response {
    if state.engine.is_shutting_down() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "shutting_down", "time": now_rfc3339() })),
        )
            .into_response();
    }
    Json(json!({ "status": "healthy", "time": now_rfc3339() })).into_response()
}

// ═══════════════════════════════════════════════════════════════
//  POST /api/sensor-data
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_sensor_data(State(state): State<AppState>, body: Bytes) -> Response {
    let reading: SensorReading = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid JSON format: {e}")),
    };
    let accepted = match reading.into_record(state.ingress.alert_threshold) {
        Ok(a) => a,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let device_id = accepted.record.device_id().to_string();
    match state.engine.router().submit(accepted.record).await {
        Ok(lane) => {
            tracing::debug!(device_id = %device_id, lane = %lane, "reading accepted");
            let mut body = json!({ "status": "accepted", "lane": lane });
            if let Some(alert) = accepted.alert {
                body["alert"] = json!(alert);
            }
            (StatusCode::ACCEPTED, Json(body)).into_response()
        }
        Err(e) => {
            tracing::warn!(device_id = %device_id, error = %e, "reading rejected");
            router_error_response(&e)
        }
    }
}

fn router_error_response(err: &RouterError) -> Response {
    // Both cases are transient from the client's point of view.
    error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
}

// ═══════════════════════════════════════════════════════════════
//  POST /api/batch-sensor-data
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct ItemResult {
    index: usize,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metric_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lane: Option<Lane>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ItemResult {
    fn skipped(index: usize, error: String) -> Self {
        Self {
            index,
            status: "skipped",
            device_id: None,
            metric_name: None,
            value: None,
            priority: None,
            lane: None,
            alert: None,
            error: Some(error),
        }
    }
}

#[derive(Serialize)]
struct LaneResult {
    lane: Lane,
    records: usize,
    committed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct BatchResponse {
    status: &'static str,
    total_received: usize,
    total_processed: usize,
    total_skipped: usize,
    total_failed: usize,
    total_alerts: usize,
    lanes: Vec<LaneResult>,
    results: Vec<ItemResult>,
}

pub(crate) async fn handle_batch_sensor_data(State(state): State<AppState>, body: Bytes) -> Response {
    let request: BatchRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid JSON format: {e}")),
    };
    let received = request.data.len();
    if received == 0 {
        return error_response(StatusCode::BAD_REQUEST, "empty data list");
    }
    let max = state.ingress.max_batch_records;
    if received > max {
        return error_response(StatusCode::BAD_REQUEST, format!("too many records (max {max})"));
    }

    // Convert; remember which request item each record came from.
    let mut results: Vec<ItemResult> = Vec::with_capacity(received);
    let mut records = Vec::with_capacity(received);
    let mut origins = Vec::with_capacity(received);
    let mut total_alerts = 0;
    for (index, reading) in request.data.into_iter().enumerate() {
        match reading.into_record(state.ingress.alert_threshold) {
            Ok(accepted) => {
                let record = &accepted.record;
                if accepted.alert.is_some() {
                    total_alerts += 1;
                }
                results.push(ItemResult {
                    index,
                    status: "pending",
                    device_id: Some(record.device_id().to_string()),
                    metric_name: Some(record.metric_name().to_string()),
                    value: Some(record.value()),
                    priority: Some(record.priority().level()),
                    lane: Some(record.priority()),
                    alert: accepted.alert,
                    error: None,
                });
                origins.push(results.len() - 1);
                records.push(accepted.record);
            }
            Err(e) => results.push(ItemResult::skipped(index, e.to_string())),
        }
    }
    let skipped = received - records.len();

    let outcome = state.engine.router().submit_batch(records).await;

    for (position, slot) in origins.iter().enumerate() {
        let item = &mut results[*slot];
        match outcome.outcome_for(position).map(|o| &o.result) {
            Some(Ok(_)) => item.status = "committed",
            Some(Err(e)) => {
                item.status = "failed";
                item.error = Some(e.to_string());
            }
            None => item.status = "failed",
        }
    }

    let lanes: Vec<LaneResult> = outcome
        .lanes
        .iter()
        .map(|o| LaneResult {
            lane: o.lane,
            records: o.submitted(),
            committed: *o.result.as_ref().unwrap_or(&0),
            error: o.result.as_ref().err().map(ToString::to_string),
        })
        .collect();

    let processed = outcome.committed();
    let failed = outcome.failed();
    let status = match (processed, failed) {
        (_, 0) => "success",
        (0, _) => "failed",
        _ => "partial",
    };
    let code = if failed > 0 && processed == 0 {
        let all_admission = outcome
            .lanes
            .iter()
            .all(|o| matches!(o.result, Err(BatchWriteError::Admission(_))));
        if all_admission {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    } else {
        StatusCode::OK
    };

    tracing::info!(
        received,
        processed,
        skipped,
        failed,
        alerts = total_alerts,
        "batch processed"
    );

    let response = BatchResponse {
        status,
        total_received: received,
        total_processed: processed,
        total_skipped: skipped,
        total_failed: failed,
        total_alerts,
        lanes,
        results,
    };
    (code, Json(response)).into_response()
}

// ═══════════════════════════════════════════════════════════════
//  GET /api/stats
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct StatsResponse {
    accepting: bool,
    devices: usize,
    total_alerts: u64,
    lanes: Vec<LaneSnapshot>,
}

pub(crate) async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsResponse {
        accepting: state.engine.router().is_accepting(),
        devices: state.board.device_count(),
        total_alerts: state.board.total_alerts(),
        lanes: state.engine.snapshot(),
    })
}

// ═══════════════════════════════════════════════════════════════
//  GET /api/devices/{device_id}
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Response {
    match state.board.get(&device_id) {
        Some(status) => Json(status).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("device '{device_id}' not found")),
    }
}
