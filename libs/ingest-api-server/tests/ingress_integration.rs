//! Integration tests for the ingress endpoints, driven through the axum router.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    routing::get as get_route,
};
use serde_json::{Value, json};
use tower::ServiceExt;

use ingest_api::Lane;
use ingest_api_server::{AppState, IngressConfig, build_router, with_http_layers};
use ingest_engine::{DeviceStatusBoard, Engine, EngineConfig, EngineHooks, LaneConfig, LanesConfig};
use ingest_storage_memory::MemorySink;

struct TestApp {
    app: Router,
    engine: Arc<Engine>,
    sink: Arc<MemorySink>,
}

fn engine_config() -> EngineConfig {
    EngineConfig {
        lanes: LanesConfig::uniform(LaneConfig::new(1, Duration::from_millis(50))),
        ..EngineConfig::default()
    }
}

fn test_app(ingress: IngressConfig) -> TestApp {
    test_app_with(engine_config(), ingress)
}

fn test_app_with(config: EngineConfig, ingress: IngressConfig) -> TestApp {
    let sink = Arc::new(MemorySink::default());
    let board = Arc::new(DeviceStatusBoard::new(ingress.alert_threshold));
    let hooks = EngineHooks {
        observer: Some(board.clone()),
        ..EngineHooks::default()
    };
    let engine = Arc::new(Engine::start(config, sink.clone(), hooks).unwrap());
    let app = build_router(AppState::new(engine.clone(), board, ingress));
    TestApp { app, engine, sink }
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn reading(device: &str, value: f64, priority: i64) -> Value {
    json!({
        "timestamp": "2024-05-01T12:00:00Z",
        "device_id": device,
        "metric_name": "temperature",
        "value": value,
        "priority": priority,
        "data": "payload"
    })
}

// Lane loops and commit tasks run on the test runtime; give them a turn.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_health_ok() {
    let t = test_app(IngressConfig::default());
    let response = t.app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["time"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_sensor_data_accepted_and_committed() {
    let t = test_app(IngressConfig::default());
    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/sensor-data", &reading("boiler-1", 42.0, 3)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["lane"], "low");
    assert!(body.get("alert").is_none());

    settle().await;
    let records = t.sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].device_id(), "boiler-1");
    assert_eq!(records[0].payload(), b"payload");

    let response = t.app.oneshot(get("/api/devices/boiler-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["current_value"], 42.0);
    assert_eq!(body["alert_count"], 0);
}

#[tokio::test]
async fn test_sensor_data_alert_goes_high() {
    let t = test_app(IngressConfig::default());
    let response = t
        .app
        .oneshot(post_json("/api/sensor-data", &reading("boiler-2", 180.0, 3)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["lane"], "high");
    assert_eq!(body["alert"], "High value alert: 180.00 exceeds threshold");
}

#[tokio::test]
async fn test_sensor_data_validation() {
    let t = test_app(IngressConfig::default());

    let missing = json!({ "device_id": "d", "value": 1.0 });
    let response = t.app.clone().oneshot(post_json("/api/sensor-data", &missing)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "missing required fields");

    let mut bad_ts = reading("d", 1.0, 1);
    bad_ts["timestamp"] = json!("01/05/2024");
    let response = t.app.clone().oneshot(post_json("/api/sensor-data", &bad_ts)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let garbage = Request::builder()
        .method(Method::POST)
        .uri("/api/sensor-data")
        .body(Body::from("{not json"))
        .unwrap();
    let response = t.app.oneshot(garbage).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    settle().await;
    assert_eq!(t.sink.attempts(), 0);
}

#[tokio::test]
async fn test_batch_reports_per_lane_and_per_item() {
    let t = test_app(IngressConfig::default());
    let request = json!({
        "data": [
            reading("a", 10.0, 1),
            reading("b", 20.0, 2),
            { "device_id": "c" },
            reading("d", 30.0, 3),
            reading("e", 150.0, 3),
        ]
    });
    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/batch-sensor-data", &request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["status"], "success");
    assert_eq!(body["total_received"], 5);
    assert_eq!(body["total_processed"], 4);
    assert_eq!(body["total_skipped"], 1);
    assert_eq!(body["total_failed"], 0);
    assert_eq!(body["total_alerts"], 1);

    let lanes = body["lanes"].as_array().unwrap();
    assert_eq!(lanes.len(), 3);
    assert_eq!(lanes[0]["lane"], "high");
    assert_eq!(lanes[0]["records"], 2);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results[2]["status"], "skipped");
    assert_eq!(results[2]["error"], "missing required fields");
    assert_eq!(results[4]["status"], "committed");
    assert_eq!(results[4]["lane"], "high");
    assert!(results[4]["alert"].is_string());

    // Batch writes wait for their commits.
    assert_eq!(t.sink.records().await.len(), 4);

    let response = t.app.oneshot(get("/api/stats")).await.unwrap();
    let stats = body_json(response).await;
    assert_eq!(stats["devices"], 4);
    assert_eq!(stats["total_alerts"], 1);
    assert_eq!(stats["lanes"][Lane::High.index()]["flushes"]["batch"], 1);
}

#[tokio::test]
async fn test_batch_size_limits() {
    let t = test_app(IngressConfig {
        max_batch_records: 2,
        ..IngressConfig::default()
    });

    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/batch-sensor-data", &json!({ "data": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "empty data list");

    let too_many = json!({ "data": [reading("a", 1.0, 1), reading("b", 1.0, 1), reading("c", 1.0, 1)] });
    let response = t
        .app
        .oneshot(post_json("/api/batch-sensor-data", &too_many))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "too many records (max 2)");
}

#[tokio::test]
async fn test_batch_commit_failure_reported() {
    let t = test_app(IngressConfig::default());
    t.sink.set_failing(true);

    let request = json!({ "data": [reading("a", 1.0, 2), reading("b", 2.0, 2)] });
    let response = t
        .app
        .oneshot(post_json("/api/batch-sensor-data", &request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["total_failed"], 2);
    assert_eq!(body["results"][0]["status"], "failed");
    assert!(body["lanes"][0]["error"].as_str().unwrap().contains("commit of 2 records"));
}

#[tokio::test]
async fn test_unknown_device_404() {
    let t = test_app(IngressConfig::default());
    let response = t.app.oneshot(get("/api/devices/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejects_after_shutdown() {
    let t = test_app(IngressConfig::default());
    t.engine.shutdown(Duration::from_secs(1)).await.unwrap();

    let response = t.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/sensor-data", &reading("a", 1.0, 1)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_json(response).await["error"].as_str().unwrap().contains("closed"));

    let request = json!({ "data": [reading("a", 1.0, 1)] });
    let response = t
        .app
        .oneshot(post_json("/api/batch-sensor-data", &request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

async fn exploding_handler() -> &'static str {
    panic!("handler blew up")
}

#[tokio::test]
async fn test_handler_panic_becomes_500() {
    let app = with_http_layers(Router::new().route("/boom", get_route(exploding_handler)));

    let response = app.clone().oneshot(get("/boom")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "internal server error");

    // The service keeps answering afterwards.
    let response = app.oneshot(get("/boom")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_admission_timeout_is_503() {
    // Lane loops live on a runtime that is never driven, so the one-slot
    // admission channel stays full after the first record.
    let parked = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let t = {
        let _guard = parked.enter();
        let config = EngineConfig {
            channel_factor: 1,
            admission_timeout_ms: 100,
            ..engine_config()
        };
        test_app_with(config, IngressConfig::default())
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap();
    rt.block_on(async {
        let response = t
            .app
            .clone()
            .oneshot(post_json("/api/sensor-data", &reading("a", 1.0, 1)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = t
            .app
            .clone()
            .oneshot(post_json("/api/sensor-data", &reading("b", 2.0, 1)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "admission timeout on lane 'high'");

        let request = json!({ "data": [reading("c", 3.0, 1)] });
        let response = t
            .app
            .oneshot(post_json("/api/batch-sensor-data", &request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    });
    assert_eq!(t.engine.snapshot()[Lane::High.index()].rejected_timeout, 2);

    parked.block_on(async {
        t.engine.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(t.sink.records().await.len(), 1);
    });
}
