//! Worker-side tests: client, dispatcher and reporter against HTTP coordinators

use serde_json::json;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voyager::coordinator::{
    ClientConfig, ClientError, CoordinatorClient, CoordinatorConfig, CoordinatorServer,
    DiscoveryReport, InjectRequest, InjectTarget, NextTarget,
};
use voyager::dispatcher::{Dispatcher, DispatcherConfig, MarkerSet, PollOutcome};
use voyager::models::{Candidate, TargetId, TargetInfo, TargetStatus};
use voyager::reporter::{Reporter, ReporterConfig};
use voyager::utils::RetryConfig;

use crate::common::{coordinator, TestCoordinator};

fn client(base_url: &str) -> CoordinatorClient {
    CoordinatorClient::new(ClientConfig::new(base_url).with_timeout(Duration::from_secs(2))).unwrap()
}

/// Serve `c` on an ephemeral local port and return its base URL
async fn spawn_coordinator(c: &TestCoordinator) -> String {
    let config = CoordinatorConfig::builder()
        .enable_request_logging(false)
        .build()
        .unwrap();
    let router = CoordinatorServer::new(config, c.orchestrator.clone())
        .unwrap()
        .build_router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    base_url
}

fn dispatcher_config(dir: &TempDir) -> DispatcherConfig {
    DispatcherConfig {
        max_local_inflight: 3,
        wait_time_secs: 1,
        relief_time_secs: 1,
        marker_dir: dir.path().to_path_buf(),
    }
}

// ============================================================================
// Client against a mock coordinator
// ============================================================================

#[tokio::test]
async fn test_client_parses_target_and_wait() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"kind": "target", "target_id": "chan_a"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"kind": "wait", "signal": "wait_pls"}
        })))
        .mount(&server)
        .await;

    let client = client(&server.uri());
    assert_eq!(
        client.next_target().await.unwrap(),
        NextTarget::Target(TargetId::from("chan_a"))
    );
    assert_eq!(client.next_target().await.unwrap(), NextTarget::Wait);
}

#[tokio::test]
async fn test_client_treats_signal_as_wait() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"kind": "target", "target_id": "wait_pls"}
        })))
        .mount(&server)
        .await;

    assert_eq!(client(&server.uri()).next_target().await.unwrap(), NextTarget::Wait);
}

#[tokio::test]
async fn test_client_error_classification() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/next"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "success": false,
            "error": "storage backend error"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/targets/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "success": false,
            "error": "Target not found: ghost"
        })))
        .mount(&server)
        .await;

    let client = client(&server.uri());
    match client.next_target().await {
        Err(e @ ClientError::HttpError { status: 503, .. }) => assert!(e.is_transport_fault()),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(client.target(&TargetId::from("ghost")).await.unwrap(), None);
}

#[tokio::test]
async fn test_unreachable_coordinator_is_transport_fault() {
    // Nothing listens on port 9 (discard) in the test environment
    let client = CoordinatorClient::new(
        ClientConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_millis(500)),
    )
    .unwrap();

    let err = client.next_target().await.unwrap_err();
    assert!(err.is_transport_fault());
}

// ============================================================================
// Dispatcher against a mock coordinator
// ============================================================================

#[tokio::test]
async fn test_dispatcher_backs_off_on_wait_then_dispatches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"kind": "wait", "signal": "wait_pls"}
        })))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"kind": "target", "target_id": "chan_a"}
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let markers = MarkerSet::open(dir.path()).unwrap();
    let mut dispatcher = Dispatcher::new(client(&server.uri()), markers.clone(), dispatcher_config(&dir));

    let mut delays = Vec::new();
    for _ in 0..3 {
        delays.push(dispatcher.poll_once().await.unwrap());
    }
    assert_eq!(
        delays,
        vec![
            PollOutcome::Backoff(Duration::from_secs(2)),
            PollOutcome::Backoff(Duration::from_secs(4)),
            PollOutcome::Backoff(Duration::from_secs(8)),
        ]
    );

    assert_eq!(
        dispatcher.poll_once().await.unwrap(),
        PollOutcome::Dispatched(TargetId::from("chan_a"))
    );
    assert!(markers.contains(&TargetId::from("chan_a")));
}

// ============================================================================
// Full worker loop against a real coordinator
// ============================================================================

#[tokio::test]
async fn test_worker_cycle_against_live_coordinator() {
    let c = coordinator(3600, 100);
    let base_url = spawn_coordinator(&c).await;

    let client_for_admin = client(&base_url);
    assert!(client_for_admin.health_check().await.unwrap().healthy);
    client_for_admin
        .inject(&InjectRequest {
            targets: vec![InjectTarget::new("seed")],
        })
        .await
        .unwrap();

    // Dispatcher claims the seed and writes a marker
    let marker_dir = TempDir::new().unwrap();
    let markers = MarkerSet::open(marker_dir.path()).unwrap();
    let mut dispatcher = Dispatcher::new(client(&base_url), markers.clone(), dispatcher_config(&marker_dir));
    assert_eq!(
        dispatcher.poll_once().await.unwrap(),
        PollOutcome::Dispatched(TargetId::from("seed"))
    );

    // The local crawler picks it up and spools its results
    assert_eq!(markers.claim_next().unwrap(), Some(TargetId::from("seed")));
    let spool = TempDir::new().unwrap();
    fs::write(
        spool.path().join("seed.discovered.json"),
        json!({
            "source": {"target_id": "seed", "title": "Seed channel"},
            "candidates": [{"target_id": "found", "display_name": "Found", "weight": 7}]
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        spool.path().join("seed-0.content.json"),
        json!({"target_id": "seed", "items": [{"item_id": "1", "text": "hello"}]}).to_string(),
    )
    .unwrap();

    let reporter = Reporter::new(
        client(&base_url),
        ReporterConfig {
            spool_dir: spool.path().to_path_buf(),
            ..ReporterConfig::default()
        },
    )
    .with_markers(markers.clone())
    .with_retry_config(RetryConfig::with_delays(1, 10, 10));

    let summary = reporter.run_once().await.unwrap();
    assert_eq!(summary.uploaded, 2);
    assert_eq!(markers.count().unwrap(), 0);
    assert!(reporter.pending_files().await.unwrap().is_empty());

    let seed = client_for_admin.target(&TargetId::from("seed")).await.unwrap().unwrap();
    assert_eq!(seed.status, TargetStatus::Done);

    // The discovered target is next in line
    assert_eq!(
        dispatcher.poll_once().await.unwrap(),
        PollOutcome::Dispatched(TargetId::from("found"))
    );

    let (stats, _) = client_for_admin.stats().await.unwrap();
    assert_eq!(stats.records.total, 2);
    assert_eq!(stats.records.done, 1);
    assert_eq!(stats.records.in_progress, 1);
}

#[tokio::test]
async fn test_target_lookup_with_reserved_url_characters() {
    let c = coordinator(3600, 100);
    let client = client(&spawn_coordinator(&c).await);

    let ids = ["a/b", "what?x=1", "tag#1", "100%"];
    client
        .inject(&InjectRequest {
            targets: ids.iter().map(|id| InjectTarget::new(*id)).collect(),
        })
        .await
        .unwrap();

    for id in ids {
        let record = client.target(&TargetId::from(id)).await.unwrap();
        assert_eq!(record.map(|r| r.target_id), Some(TargetId::from(id)), "lookup of {id}");
    }
    assert_eq!(client.target(&TargetId::from("a")).await.unwrap(), None);
}

#[tokio::test]
async fn test_empty_signal_id_cannot_strand_a_claim() {
    let c = coordinator(3600, 100);
    let client = client(&spawn_coordinator(&c).await);

    let err = client
        .inject(&InjectRequest {
            targets: vec![InjectTarget::new("wait_pls")],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::HttpError { status: 400, .. }));

    client
        .inject(&InjectRequest {
            targets: vec![InjectTarget::new("src")],
        })
        .await
        .unwrap();
    assert_eq!(client.next_target().await.unwrap(), NextTarget::Target(TargetId::from("src")));

    let ack = client
        .report_discovered(&DiscoveryReport {
            source: TargetInfo::new("src"),
            candidates: vec![Candidate::new("wait_pls", None, 5)],
        })
        .await
        .unwrap();
    assert_eq!(ack.admitted, 0);
    assert_eq!(ack.rejected, 1);

    // Nothing is left claimed behind the worker's back
    assert_eq!(client.next_target().await.unwrap(), NextTarget::Wait);
    let (stats, _) = client.stats().await.unwrap();
    assert_eq!(stats.records.in_progress, 0);
    assert_eq!(client.target(&TargetId::from("wait_pls")).await.unwrap(), None);
}
