//! Frontier selection policy
//!
//! A pure decision over a snapshot of records. It never touches the store;
//! the caller turns a [`Decision::Claim`] into a compare-and-set transition.
//!
//! Rules, in order:
//!
//! 1. `in_progress` records are ignored (already claimed).
//! 2. Any `pending` record wins over every `done` record. Among pending
//!    records the highest `priority` wins, then the earliest `enqueued_at`,
//!    then the smallest `target_id`.
//! 3. Otherwise the stalest `done` record (smallest `visit_started_at`, then
//!    smallest `target_id`) is chosen, but only if at least
//!    `min_revisit_interval` has passed since it was last started.
//! 4. Otherwise the frontier is empty.

use chrono::{DateTime, Duration, Utc};

use crate::models::{TargetId, TargetRecord, TargetStatus};

/// Why the policy produced no target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// Neither pending nor done records are visible
    NoEligibleRecords,

    /// The stalest done record was visited too recently
    RevisitTooSoon { eligible_at: DateTime<Utc> },
}

/// Outcome of one selection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Claim `target_id`, expecting it to still be in `from`
    Claim { target_id: TargetId, from: TargetStatus },
    Empty(EmptyReason),
}

impl Decision {
    pub fn is_empty(&self) -> bool {
        matches!(self, Decision::Empty(_))
    }

    pub fn target_id(&self) -> Option<&TargetId> {
        match self {
            Decision::Claim { target_id, .. } => Some(target_id),
            Decision::Empty(_) => None,
        }
    }
}

/// Pick the next target from `records` at time `now`
pub fn select<'a, I>(records: I, now: DateTime<Utc>, min_revisit_interval: Duration) -> Decision
where
    I: IntoIterator<Item = &'a TargetRecord>,
{
    let mut best_pending: Option<&TargetRecord> = None;
    let mut stalest_done: Option<&TargetRecord> = None;

    for record in records {
        match record.status {
            TargetStatus::InProgress => {}
            TargetStatus::Pending => {
                if best_pending.map_or(true, |best| outranks(record, best)) {
                    best_pending = Some(record);
                }
            }
            TargetStatus::Done => {
                if stalest_done.map_or(true, |stalest| staler(record, stalest)) {
                    stalest_done = Some(record);
                }
            }
        }
    }

    if let Some(record) = best_pending {
        return Decision::Claim {
            target_id: record.target_id.clone(),
            from: TargetStatus::Pending,
        };
    }

    match stalest_done {
        Some(record) => {
            let started = last_started(record);
            if now.signed_duration_since(started) < min_revisit_interval {
                let eligible_at = started
                    .checked_add_signed(min_revisit_interval)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                Decision::Empty(EmptyReason::RevisitTooSoon { eligible_at })
            } else {
                Decision::Claim {
                    target_id: record.target_id.clone(),
                    from: TargetStatus::Done,
                }
            }
        }
        None => Decision::Empty(EmptyReason::NoEligibleRecords),
    }
}

/// Whether pending record `a` should be handed out before `b`
fn outranks(a: &TargetRecord, b: &TargetRecord) -> bool {
    (std::cmp::Reverse(a.priority), a.enqueued_at, &a.target_id)
        < (std::cmp::Reverse(b.priority), b.enqueued_at, &b.target_id)
}

/// Whether done record `a` has waited longer than `b`
fn staler(a: &TargetRecord, b: &TargetRecord) -> bool {
    (last_started(a), &a.target_id) < (last_started(b), &b.target_id)
}

/// Done records without a start time count as started at the epoch
fn last_started(record: &TargetRecord) -> DateTime<Utc> {
    record.visit_started_at.unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn pending(id: &str, priority: i64, enqueued: i64) -> TargetRecord {
        TargetRecord::pending(TargetId::from(id), None, priority, ts(enqueued))
    }

    fn done(id: &str, started: i64) -> TargetRecord {
        let mut r = pending(id, 0, 0);
        r.status = TargetStatus::Done;
        r.visit_started_at = Some(ts(started));
        r
    }

    fn in_progress(id: &str, priority: i64) -> TargetRecord {
        let mut r = pending(id, priority, 0);
        r.status = TargetStatus::InProgress;
        r.visit_started_at = Some(ts(0));
        r
    }

    const HOUR: i64 = 3600;

    #[test]
    fn test_picks_highest_priority_pending() {
        let records = vec![pending("a", 5, 1), pending("b", 20, 2), pending("c", 3, 3)];
        let decision = select(&records, ts(10), Duration::seconds(HOUR));
        assert_eq!(
            decision,
            Decision::Claim {
                target_id: TargetId::from("b"),
                from: TargetStatus::Pending
            }
        );
    }

    #[test]
    fn test_pending_ties_break_by_enqueue_time_then_id() {
        let records = vec![pending("z", 9, 5), pending("y", 9, 1), pending("x", 9, 5)];
        let decision = select(&records, ts(10), Duration::seconds(HOUR));
        assert_eq!(decision.target_id(), Some(&TargetId::from("y")));

        let records = vec![pending("z", 9, 5), pending("x", 9, 5)];
        let decision = select(&records, ts(10), Duration::seconds(HOUR));
        assert_eq!(decision.target_id(), Some(&TargetId::from("x")));
    }

    #[test]
    fn test_pending_outranks_stale_done() {
        let records = vec![done("old", 0), pending("new", -100, 50)];
        let decision = select(&records, ts(1_000_000), Duration::seconds(HOUR));
        assert_eq!(decision.target_id(), Some(&TargetId::from("new")));
    }

    #[test]
    fn test_in_progress_is_ignored() {
        let records = vec![in_progress("busy", 1000), pending("free", 1, 0)];
        let decision = select(&records, ts(10), Duration::seconds(HOUR));
        assert_eq!(decision.target_id(), Some(&TargetId::from("free")));

        let only_busy = vec![in_progress("busy", 1000)];
        assert_eq!(
            select(&only_busy, ts(10), Duration::seconds(HOUR)),
            Decision::Empty(EmptyReason::NoEligibleRecords)
        );
    }

    #[test]
    fn test_revisit_interval_boundary() {
        let now = ts(100_000);
        let interval = Duration::seconds(HOUR);

        let too_recent = vec![done("d", 100_000 - HOUR + 1)];
        assert!(select(&too_recent, now, interval).is_empty());

        let stale_enough = vec![done("d", 100_000 - HOUR - 1)];
        assert_eq!(
            select(&stale_enough, now, interval),
            Decision::Claim {
                target_id: TargetId::from("d"),
                from: TargetStatus::Done
            }
        );

        let exactly = vec![done("d", 100_000 - HOUR)];
        assert!(!select(&exactly, now, interval).is_empty());
    }

    #[test]
    fn test_stalest_done_wins() {
        let now = ts(1_000_000);
        let records = vec![done("recent", 900_000), done("oldest", 10), done("older", 500)];
        let decision = select(&records, now, Duration::seconds(60));
        assert_eq!(decision.target_id(), Some(&TargetId::from("oldest")));
    }

    #[test]
    fn test_too_soon_reports_eligibility_time() {
        let records = vec![done("d", 1_000)];
        let decision = select(&records, ts(1_010), Duration::seconds(60));
        assert_eq!(
            decision,
            Decision::Empty(EmptyReason::RevisitTooSoon {
                eligible_at: ts(1_060)
            })
        );
    }

    #[test]
    fn test_empty_snapshot() {
        let records: Vec<TargetRecord> = Vec::new();
        assert_eq!(
            select(&records, ts(0), Duration::seconds(60)),
            Decision::Empty(EmptyReason::NoEligibleRecords)
        );
    }
}
