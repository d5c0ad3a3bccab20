//! Schedule Planner: pure assignment of `(domain_index, scheduled_for)` to a
//! batch of pending queue items. Takes a snapshot of existing commitments
//! and never touches the store itself — the Launch Coordinator owns
//! snapshotting and persistence.

use std::collections::HashMap;

use rand::Rng;
use uuid::Uuid;

use crate::models::{PlanAssignment, PlanInput};
use crate::scheduling::{adjust_to_working_hours, start_time, PlannerConfig};

/// The latest `scheduled_for` per `domain_index` among all `queued`/
/// `processing` rows system-wide, at the moment planning begins.
pub type Commitments = HashMap<i32, chrono::DateTime<chrono::Utc>>;

/// Plans a batch of items against a shared commitments snapshot and a pool
/// of `pool_size` domains (indices `0..pool_size`). Pure: never touches the
/// store or the wall clock beyond reading `now` once at the top. Does not
/// compute `from_email` — that is the Launch Coordinator's job once it has
/// the campaign's sender in hand (spec: the Planner only assigns domain and
/// time; from_email is derived from domain_index afterward).
///
/// `commitments` is consulted and then mutated in place so a caller planning
/// several campaigns back-to-back in one process can reuse the running map
/// across calls.
pub fn plan(
    items: &[PlanInput],
    pool_size: usize,
    commitments: &mut Commitments,
    cfg: &PlannerConfig,
) -> Vec<PlanAssignment> {
    plan_at(items, pool_size, commitments, cfg, chrono::Utc::now())
}

/// Same as [`plan`] but with an injected `now`, for deterministic tests.
pub fn plan_at(
    items: &[PlanInput],
    pool_size: usize,
    commitments: &mut Commitments,
    cfg: &PlannerConfig,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<PlanAssignment> {
    let pool_len = pool_size as i32;
    let window_start = start_time(now, cfg);

    let mut round_robin: i32 = 0;
    let mut assignments = Vec::with_capacity(items.len());

    for item in items {
        let domain_index = match item.existing_domain_index {
            Some(d) => d,
            None => {
                let d = round_robin % pool_len;
                round_robin += 1;
                d
            }
        };

        let jitter = jitter_duration(cfg.jitter_max_secs);

        let candidate = match commitments.get(&domain_index) {
            Some(last) => *last + cfg.interval() + jitter,
            None => window_start + jitter,
        };

        let scheduled_for = if cfg.disable_working_hours {
            candidate
        } else {
            adjust_to_working_hours(candidate, cfg)
        };

        commitments.insert(domain_index, scheduled_for);

        assignments.push(PlanAssignment {
            id: item.id,
            domain_index,
            scheduled_for,
        });
    }

    assignments
}

fn jitter_duration(jitter_max_secs: u32) -> chrono::Duration {
    if jitter_max_secs == 0 {
        return chrono::Duration::zero();
    }
    let secs: f64 = rand::thread_rng().gen_range(0.0..jitter_max_secs as f64);
    chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
}

pub fn input(id: Uuid, existing_domain_index: Option<i32>) -> PlanInput {
    PlanInput {
        id,
        existing_domain_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::Los_Angeles;

    fn cfg() -> PlannerConfig {
        PlannerConfig {
            timezone: Los_Angeles,
            work_start: 9,
            work_end: 17,
            interval_minutes: 3.5,
            jitter_max_secs: 0,
            skip_weekends: true,
            disable_working_hours: false,
        }
    }

    fn monday_9am_utc() -> chrono::DateTime<chrono::Utc> {
        Los_Angeles
            .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&chrono::Utc)
    }

    #[test]
    fn round_robins_across_two_domains() {
        let items: Vec<PlanInput> = (0..5).map(|_| input(Uuid::new_v4(), None)).collect();
        let mut commitments = Commitments::new();
        let assignments = super::plan_at(&items, 2, &mut commitments, &cfg(), monday_9am_utc());
        let indices: Vec<i32> = assignments.iter().map(|a| a.domain_index).collect();
        assert_eq!(indices, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn pinned_domain_serializes_by_interval() {
        let id = Uuid::new_v4();
        let items = vec![input(id, Some(3)), input(Uuid::new_v4(), Some(3))];
        let mut commitments = Commitments::new();
        commitments.insert(3, monday_9am_utc());
        let assignments = super::plan_at(&items, 28, &mut commitments, &cfg(), monday_9am_utc());
        assert_eq!(assignments[0].domain_index, 3);
        assert_eq!(assignments[1].domain_index, 3);
        assert!(assignments[1].scheduled_for > assignments[0].scheduled_for);
        let gap = assignments[1].scheduled_for - assignments[0].scheduled_for;
        assert!(gap >= chrono::Duration::seconds(209)); // 3.5min = 210s, allow rounding
    }

    #[test]
    fn working_hours_enforced_on_output() {
        let items: Vec<PlanInput> = (0..3).map(|_| input(Uuid::new_v4(), Some(0))).collect();
        let mut commitments = Commitments::new();
        commitments.insert(0, {
            Los_Angeles
                .with_ymd_and_hms(2024, 1, 1, 16, 58, 0)
                .single()
                .unwrap()
                .with_timezone(&chrono::Utc)
        });
        let assignments = super::plan_at(&items, 28, &mut commitments, &cfg(), monday_9am_utc());
        for a in &assignments {
            let local = a.scheduled_for.with_timezone(&Los_Angeles);
            use chrono::Timelike;
            assert!(local.hour() >= 9 && local.hour() < 17);
        }
    }
}
