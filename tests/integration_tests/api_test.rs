//! HTTP API tests against the axum router

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use voyager::coordinator::{CoordinatorConfig, CoordinatorServer};

use crate::common::coordinator;

fn router(min_revisit_interval_secs: u64, max_outstanding: usize) -> Router {
    let c = coordinator(min_revisit_interval_secs, max_outstanding);
    let config = CoordinatorConfig::builder()
        .enable_request_logging(false)
        .build()
        .unwrap();
    CoordinatorServer::new(config, c.orchestrator)
        .unwrap()
        .build_router()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let router = router(60, 100);
    let (status, body) = send(&router, get("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
}

#[tokio::test]
async fn test_empty_frontier_answers_wait_signal() {
    let router = router(60, 100);
    let (status, body) = send(&router, get("/api/next")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"kind": "wait", "signal": "wait_pls"}));
}

#[tokio::test]
async fn test_full_cycle_over_http() {
    let router = router(60, 100);

    let (status, body) = send(
        &router,
        post(
            "/api/targets",
            json!({"targets": [{"target_id": "t1", "display_name": "A", "priority": 10}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["summary"]["admitted"], 1);
    assert_eq!(body["data"]["outcomes"][0]["outcome"], "admitted");

    let (_, body) = send(&router, get("/api/next")).await;
    assert_eq!(body["data"], json!({"kind": "target", "target_id": "t1"}));

    let (_, body) = send(&router, get("/api/targets/t1")).await;
    assert_eq!(body["data"]["status"], "in_progress");

    let (status, body) = send(
        &router,
        post(
            "/api/discovered",
            json!({
                "source": {"target_id": "t1", "title": "Channel A", "member_count": 42},
                "candidates": [{"target_id": "t2", "display_name": "B", "weight": 4}]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["admitted"], 1);
    assert_eq!(body["data"]["source_marked_done"], true);

    let (_, body) = send(&router, get("/api/targets/t1")).await;
    assert_eq!(body["data"]["status"], "done");

    let (_, body) = send(&router, get("/api/next")).await;
    assert_eq!(body["data"]["target_id"], "t2");

    let (_, body) = send(&router, get("/api/stats")).await;
    assert_eq!(body["data"]["frontier"]["records"]["total"], 2);
    assert_eq!(body["data"]["frontier"]["records"]["in_progress"], 1);
    assert_eq!(body["data"]["frontier"]["records"]["done"], 1);
}

#[tokio::test]
async fn test_unknown_target_is_404() {
    let router = router(60, 100);
    let (status, body) = send(&router, get("/api/targets/nobody")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_empty_source_is_400() {
    let router = router(60, 100);
    let (status, body) = send(
        &router,
        post("/api/discovered", json!({"source": {"target_id": ""}, "candidates": []})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_capacity_rejection_over_http() {
    let router = router(60, 1);
    send(&router, post("/api/targets", json!({"targets": [{"target_id": "seed"}]}))).await;
    send(&router, get("/api/next")).await;

    let (status, body) = send(
        &router,
        post(
            "/api/discovered",
            json!({
                "source": {"target_id": "seed"},
                "candidates": [
                    {"target_id": "n1", "weight": 1},
                    {"target_id": "seed", "weight": 1}
                ]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rejected"], 2);
    assert_eq!(body["data"]["source_marked_done"], true);
}

#[tokio::test]
async fn test_content_reports_per_item_results() {
    let router = router(60, 100);
    let (status, body) = send(
        &router,
        post(
            "/api/content",
            json!({"target_id": "chan", "items": [
                {"item_id": "1", "text": "hello", "forwards": 3},
                {"item_id": "2", "text": "world"}
            ]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r["ok"] == true));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    voyager::metrics::init_metrics().ok();
    let router = router(60, 100);
    send(&router, get("/api/next")).await;

    let response = router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("voyager_next_requests_total"));
}
