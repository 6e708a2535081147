//! Frontier scenarios driven through the orchestration service

use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

use voyager::coordinator::{ContentReport, DiscoveryReport, InjectTarget, NextTarget};
use voyager::frontier::{AdmissionGate, AdmissionOutcome};
use voyager::models::{Candidate, ContentItem, TargetId, TargetInfo, TargetStatus};
use voyager::storage::{InMemoryTargetStore, Stores, TargetStore};
use voyager::utils::ManualClock;

use crate::common::{coordinator, coordinator_with_stores, done, pending, t0};

fn report(source: &str, candidates: Vec<Candidate>) -> DiscoveryReport {
    DiscoveryReport {
        source: TargetInfo::new(source),
        candidates,
    }
}

#[tokio::test]
async fn test_end_to_end_single_target_cycle() {
    let c = coordinator(60, 10_000);

    let ack = c
        .orchestrator
        .inject(&[InjectTarget {
            priority: Some(10),
            display_name: Some("A".into()),
            ..InjectTarget::new("t1")
        }])
        .await
        .unwrap();
    assert_eq!(ack.outcomes[0].outcome, AdmissionOutcome::Admitted);

    let next = c.orchestrator.request_next().await.unwrap();
    assert_eq!(next, NextTarget::Target(TargetId::from("t1")));
    let record = c.orchestrator.target(&TargetId::from("t1")).await.unwrap().unwrap();
    assert_eq!(record.status, TargetStatus::InProgress);

    let ack = c.orchestrator.report_discovered(report("t1", vec![])).await.unwrap();
    assert!(ack.source_marked_done);
    let record = c.orchestrator.target(&TargetId::from("t1")).await.unwrap().unwrap();
    assert_eq!(record.status, TargetStatus::Done);

    assert_eq!(c.orchestrator.request_next().await.unwrap(), NextTarget::Wait);

    // Once the interval has passed the same target is handed out again
    c.clock.advance(Duration::seconds(61));
    assert_eq!(
        c.orchestrator.request_next().await.unwrap(),
        NextTarget::Target(TargetId::from("t1"))
    );
}

#[tokio::test]
async fn test_discovery_feeds_the_frontier() {
    let c = coordinator(3600, 10_000);
    c.orchestrator.inject(&[InjectTarget::new("seed")]).await.unwrap();
    c.orchestrator.request_next().await.unwrap();

    let ack = c
        .orchestrator
        .report_discovered(report(
            "seed",
            vec![
                Candidate::new("low", Some("Low"), 2),
                Candidate::new("high", Some("High"), 9),
                Candidate::new("seed", None, 1),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(ack.admitted, 2);
    assert_eq!(ack.skipped, 1);

    assert_eq!(
        c.orchestrator.request_next().await.unwrap(),
        NextTarget::Target(TargetId::from("high"))
    );
    assert_eq!(
        c.orchestrator.request_next().await.unwrap(),
        NextTarget::Target(TargetId::from("low"))
    );
    assert_eq!(c.orchestrator.request_next().await.unwrap(), NextTarget::Wait);
}

#[tokio::test]
async fn test_priority_picks_highest_first() {
    let store = Arc::new(InMemoryTargetStore::with_records([
        pending("five", 5),
        pending("twenty", 20),
        pending("three", 3),
    ]));
    let stores = Stores {
        targets: store,
        ..Stores::in_memory()
    };
    let c = coordinator_with_stores(stores, 60, 10_000);

    let mut picked = Vec::new();
    for _ in 0..3 {
        match c.orchestrator.request_next().await.unwrap() {
            NextTarget::Target(id) => picked.push(id.to_string()),
            NextTarget::Wait => panic!("frontier unexpectedly empty"),
        }
    }
    assert_eq!(picked, vec!["twenty", "five", "three"]);
}

#[tokio::test]
async fn test_revisit_interval_boundary() {
    let interval = 60;
    let now = t0();

    // Visited one second too recently: never selected
    let too_recent = done("recent", now - Duration::seconds(interval - 1));
    let stores = Stores {
        targets: Arc::new(InMemoryTargetStore::with_records([too_recent])),
        ..Stores::in_memory()
    };
    let c = coordinator_with_stores(stores, interval as u64, 10_000);
    assert_eq!(c.orchestrator.request_next().await.unwrap(), NextTarget::Wait);

    // Visited one second past the interval: selected
    let stale = done("stale", now - Duration::seconds(interval + 1));
    let stores = Stores {
        targets: Arc::new(InMemoryTargetStore::with_records([stale])),
        ..Stores::in_memory()
    };
    let c = coordinator_with_stores(stores, interval as u64, 10_000);
    assert_eq!(
        c.orchestrator.request_next().await.unwrap(),
        NextTarget::Target(TargetId::from("stale"))
    );
}

#[tokio::test]
async fn test_revisits_round_robin_by_staleness() {
    let now = t0();
    let stores = Stores {
        targets: Arc::new(InMemoryTargetStore::with_records([
            done("b", now - Duration::hours(3)),
            done("a", now - Duration::hours(5)),
            done("c", now - Duration::hours(4)),
        ])),
        ..Stores::in_memory()
    };
    let c = coordinator_with_stores(stores, 3600, 10_000);

    let mut order = Vec::new();
    for _ in 0..3 {
        if let NextTarget::Target(id) = c.orchestrator.request_next().await.unwrap() {
            order.push(id.to_string());
        }
    }
    assert_eq!(order, vec!["a", "c", "b"]);
}

#[tokio::test]
async fn test_concurrent_claims_are_distinct() {
    const N: usize = 50;
    let records = (0..N).map(|i| pending(&format!("t{i:02}"), (i % 7) as i64));
    let stores = Stores {
        targets: Arc::new(InMemoryTargetStore::with_records(records)),
        ..Stores::in_memory()
    };
    let c = coordinator_with_stores(stores, 3600, 10_000);

    let handles = (0..N + 10).map(|_| {
        let orchestrator = Arc::clone(&c.orchestrator);
        tokio::spawn(async move { orchestrator.request_next().await })
    });

    let mut claimed = HashSet::new();
    let mut waits = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap().unwrap() {
            NextTarget::Target(id) => assert!(claimed.insert(id), "target handed out twice"),
            NextTarget::Wait => waits += 1,
        }
    }

    // Every claim is unique; any remaining pending records stay claimable
    let counts = c.stores.targets.status_counts().await.unwrap();
    assert_eq!(counts.in_progress, claimed.len());
    assert_eq!(counts.pending + counts.in_progress, N);
    assert!(waits >= 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_on_sqlite() {
    const N: usize = 20;
    let dir = TempDir::new().unwrap();
    let stores = Stores::sqlite(dir.path().join("frontier.db")).unwrap();
    for i in 0..N {
        stores.targets.create(pending(&format!("t{i:02}"), 1)).await.unwrap();
    }
    let c = coordinator_with_stores(stores, 3600, 10_000);

    let mut handles = Vec::new();
    for _ in 0..N {
        let orchestrator = Arc::clone(&c.orchestrator);
        handles.push(tokio::spawn(async move { orchestrator.request_next().await }));
    }

    let mut claimed = HashSet::new();
    for handle in handles {
        if let NextTarget::Target(id) = handle.await.unwrap().unwrap() {
            assert!(claimed.insert(id), "target handed out twice");
        }
    }

    let counts = c.stores.targets.status_counts().await.unwrap();
    assert_eq!(counts.in_progress, claimed.len());
    assert_eq!(counts.total, N);
}

#[tokio::test]
async fn test_admit_twice_is_skipped() {
    let store: Arc<dyn TargetStore> = Arc::new(InMemoryTargetStore::new());
    let gate = AdmissionGate::new(Arc::clone(&store), Arc::new(ManualClock::new(t0())), 100);

    let first = gate.admit(&[Candidate::new("x", None, 1)], false).await.unwrap();
    let second = gate.admit(&[Candidate::new("x", None, 5)], false).await.unwrap();

    assert_eq!(first[0].outcome, AdmissionOutcome::Admitted);
    assert_eq!(second[0].outcome, AdmissionOutcome::SkippedAlreadyKnown);
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(store.get(&TargetId::from("x")).await.unwrap().unwrap().priority, 1);
}

#[tokio::test]
async fn test_full_store_rejects_whole_batch() {
    let store: Arc<dyn TargetStore> = Arc::new(InMemoryTargetStore::with_records([
        pending("a", 1),
        pending("b", 1),
    ]));
    let gate = AdmissionGate::new(Arc::clone(&store), Arc::new(ManualClock::new(t0())), 2);

    let outcomes = gate
        .admit(
            &[Candidate::new("a", None, 1), Candidate::new("new", None, 1)],
            false,
        )
        .await
        .unwrap();
    assert!(outcomes
        .iter()
        .all(|o| o.outcome == AdmissionOutcome::RejectedCapacity));

    // Forcing bypasses the cap but never dedup
    let forced = gate
        .admit(
            &[Candidate::new("a", None, 1), Candidate::new("new", None, 1)],
            true,
        )
        .await
        .unwrap();
    assert_eq!(forced[0].outcome, AdmissionOutcome::SkippedAlreadyKnown);
    assert_eq!(forced[1].outcome, AdmissionOutcome::Admitted);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_discovery_for_idle_source_is_harmless() {
    let c = coordinator(60, 10_000);
    c.orchestrator.inject(&[InjectTarget::new("p")]).await.unwrap();

    // Pending, never claimed
    let ack = c
        .orchestrator
        .report_discovered(report("p", vec![Candidate::new("q", None, 1)]))
        .await
        .unwrap();
    assert!(!ack.source_marked_done);
    assert_eq!(ack.admitted, 1);
    let record = c.orchestrator.target(&TargetId::from("p")).await.unwrap().unwrap();
    assert_eq!(record.status, TargetStatus::Pending);

    // Unknown source
    let ack = c.orchestrator.report_discovered(report("ghost", vec![])).await.unwrap();
    assert!(!ack.source_marked_done);
}

#[tokio::test]
async fn test_content_pass_through_reports_per_item() {
    let c = coordinator(60, 10_000);
    let result = c
        .orchestrator
        .report_content(ContentReport {
            target_id: TargetId::from("chan"),
            items: vec![
                ContentItem::new("1").with_field("text", serde_json::json!("hello")),
                ContentItem::new(""),
            ],
        })
        .await
        .unwrap();

    assert_eq!(result.succeeded(), 1);
    assert_eq!(result.failed(), 1);
    assert!(!result.all_ok());
}
