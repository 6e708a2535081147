//! Property tests for the frontier selection policy

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

use voyager::frontier::{Decision, EmptyReason};
use voyager::frontier::policy::select;
use voyager::models::{TargetId, TargetRecord, TargetStatus};

fn base() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn record(i: usize, status: u8, priority: i64, enqueued: i64, visited: Option<i64>) -> TargetRecord {
    let status = match status % 3 {
        0 => TargetStatus::Pending,
        1 => TargetStatus::InProgress,
        _ => TargetStatus::Done,
    };
    TargetRecord {
        target_id: TargetId::from(format!("t{i:03}")),
        display_name: None,
        priority,
        status,
        enqueued_at: base() + Duration::seconds(enqueued),
        visit_started_at: visited.map(|v| base() + Duration::seconds(v)),
    }
}

fn records() -> impl Strategy<Value = Vec<TargetRecord>> {
    prop::collection::vec(
        (any::<u8>(), -50i64..50, 0i64..1_000, prop::option::of(0i64..100_000)),
        0..40,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (status, priority, enqueued, visited))| {
                record(i, status, priority, enqueued, visited)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn pending_outranks_everything(records in records(), interval in 0i64..200_000) {
        let now = base() + Duration::seconds(100_000);
        let decision = select(&records, now, Duration::seconds(interval));

        let pending: Vec<_> = records.iter().filter(|r| r.status == TargetStatus::Pending).collect();
        if let Some(max_priority) = pending.iter().map(|r| r.priority).max() {
            match decision {
                Decision::Claim { target_id, from } => {
                    prop_assert_eq!(from, TargetStatus::Pending);
                    let chosen = records.iter().find(|r| r.target_id == target_id).unwrap();
                    prop_assert_eq!(chosen.priority, max_priority);
                }
                Decision::Empty(_) => prop_assert!(false, "pending records exist"),
            }
        }
    }

    #[test]
    fn revisit_respects_interval(records in records(), interval in 0i64..200_000) {
        let records: Vec<_> = records
            .into_iter()
            .filter(|r| r.status != TargetStatus::Pending)
            .collect();
        let now = base() + Duration::seconds(100_000);
        let interval = Duration::seconds(interval);

        match select(&records, now, interval) {
            Decision::Claim { target_id, from } => {
                prop_assert_eq!(from, TargetStatus::Done);
                let chosen = records.iter().find(|r| r.target_id == target_id).unwrap();
                let last = chosen.visit_started_at.unwrap_or(DateTime::UNIX_EPOCH);
                prop_assert!(now.signed_duration_since(last) >= interval);

                // Nothing done is staler than the chosen record
                for r in records.iter().filter(|r| r.status == TargetStatus::Done) {
                    prop_assert!(r.visit_started_at.unwrap_or(DateTime::UNIX_EPOCH) >= last);
                }
            }
            Decision::Empty(EmptyReason::NoEligibleRecords) => {
                prop_assert!(records.iter().all(|r| r.status != TargetStatus::Done));
            }
            Decision::Empty(EmptyReason::RevisitTooSoon { .. }) => {
                let stalest = records
                    .iter()
                    .filter(|r| r.status == TargetStatus::Done)
                    .map(|r| r.visit_started_at.unwrap_or(DateTime::UNIX_EPOCH))
                    .min()
                    .unwrap();
                prop_assert!(now.signed_duration_since(stalest) < interval);
            }
        }
    }

    #[test]
    fn selection_is_deterministic(mut records in records(), interval in 0i64..200_000) {
        let now = base() + Duration::seconds(100_000);
        let interval = Duration::seconds(interval);
        let first = select(&records, now, interval);
        records.reverse();
        prop_assert_eq!(select(&records, now, interval), first);
    }
}
