//! Working-hours and timezone arithmetic shared by the Planner.
//!
//! Mirrors the original `shared/scheduling.py` functions one-to-one:
//! `create_date_in_timezone` -> `local_date`, `next_weekday_start`,
//! `get_start_time_in_timezone` -> `start_time`, `adjust_to_working_hours`.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub timezone: Tz,
    pub work_start: u32,
    pub work_end: u32,
    /// Minimum spacing per domain, fractional minutes allowed.
    pub interval_minutes: f64,
    pub jitter_max_secs: u32,
    pub skip_weekends: bool,
    pub disable_working_hours: bool,
}

impl PlannerConfig {
    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.interval_minutes * 60_000.0).round() as i64)
    }
}

/// Saturday = 5, Sunday = 6 (matches Python's `datetime.weekday()`).
fn is_weekend(weekday: chrono::Weekday) -> bool {
    matches!(weekday, chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn local_date(tz: &Tz, year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    tz.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid local wall-clock time")
        .with_timezone(&Utc)
}

/// Midnight of the next calendar day (in `tz`), rolled past the weekend if
/// configured to, at `work_start` local.
pub fn next_weekday_start(candidate_utc: DateTime<Utc>, cfg: &PlannerConfig) -> DateTime<Utc> {
    let zoned = candidate_utc.with_timezone(&cfg.timezone);
    let mut next_day = zoned.date_naive().succ_opt().expect("date does not overflow");

    if cfg.skip_weekends {
        while is_weekend(next_day.weekday()) {
            next_day = next_day.succ_opt().expect("date does not overflow");
        }
    }

    local_date(
        &cfg.timezone,
        next_day.year(),
        next_day.month(),
        next_day.day(),
        cfg.work_start,
    )
}

/// The earliest instant, at or after `now_utc`, that lies inside a working
/// window — used to seed the first commitment for a domain that has none.
pub fn start_time(now_utc: DateTime<Utc>, cfg: &PlannerConfig) -> DateTime<Utc> {
    if cfg.disable_working_hours {
        return now_utc;
    }

    let zoned = now_utc.with_timezone(&cfg.timezone);

    if cfg.skip_weekends && is_weekend(zoned.weekday()) {
        return next_weekday_start(now_utc, cfg);
    }

    let hour = zoned.hour();
    if hour < cfg.work_start {
        local_date(
            &cfg.timezone,
            zoned.year(),
            zoned.month(),
            zoned.day(),
            cfg.work_start,
        )
    } else if hour >= cfg.work_end {
        next_weekday_start(now_utc, cfg)
    } else {
        now_utc
    }
}

/// Clamp `candidate_utc` into the next valid working window: roll weekend
/// candidates to the next weekday's `work_start`, roll candidates at or past
/// `work_end` to the next weekday's `work_start`. A candidate already before
/// `work_start` on a weekday is left as-is — the planner never produces one
/// (every candidate descends from a prior `start_time`/`adjust` result or a
/// commitment already inside the window), matching the original's behavior.
pub fn adjust_to_working_hours(candidate_utc: DateTime<Utc>, cfg: &PlannerConfig) -> DateTime<Utc> {
    if cfg.disable_working_hours {
        return candidate_utc;
    }

    let zoned = candidate_utc.with_timezone(&cfg.timezone);

    if cfg.skip_weekends && is_weekend(zoned.weekday()) {
        return next_weekday_start(candidate_utc, cfg);
    }

    let boundary_end = local_date(
        &cfg.timezone,
        zoned.year(),
        zoned.month(),
        zoned.day(),
        cfg.work_end,
    );

    if candidate_utc >= boundary_end {
        next_weekday_start(candidate_utc, cfg)
    } else {
        candidate_utc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Los_Angeles;

    fn cfg() -> PlannerConfig {
        PlannerConfig {
            timezone: Los_Angeles,
            work_start: 9,
            work_end: 17,
            interval_minutes: 3.5,
            jitter_max_secs: 30,
            skip_weekends: true,
            disable_working_hours: false,
        }
    }

    #[test]
    fn clamps_past_work_end_to_next_day() {
        // Monday 16:58 local + 3.5 min => 17:01:30, past work_end.
        let last = Los_Angeles
            .with_ymd_and_hms(2024, 1, 1, 16, 58, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc);
        let candidate = last + chrono::Duration::milliseconds((3.5 * 60_000.0) as i64);
        let adjusted = adjust_to_working_hours(candidate, &cfg());
        let local = adjusted.with_timezone(&Los_Angeles);
        assert_eq!(local.weekday(), chrono::Weekday::Tue);
        assert_eq!(local.hour(), 9);
        assert_eq!(local.minute(), 0);
    }

    #[test]
    fn weekend_candidate_rolls_to_monday() {
        // Saturday noon local.
        let candidate = Los_Angeles
            .with_ymd_and_hms(2024, 1, 6, 12, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc);
        let adjusted = adjust_to_working_hours(candidate, &cfg());
        let local = adjusted.with_timezone(&Los_Angeles);
        assert_eq!(local.weekday(), chrono::Weekday::Mon);
        assert_eq!(local.hour(), 9);
    }

    #[test]
    fn within_window_candidate_is_unchanged() {
        let candidate = Los_Angeles
            .with_ymd_and_hms(2024, 1, 2, 10, 30, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(adjust_to_working_hours(candidate, &cfg()), candidate);
    }

    #[test]
    fn disable_working_hours_passes_through() {
        let mut c = cfg();
        c.disable_working_hours = true;
        let candidate = Los_Angeles
            .with_ymd_and_hms(2024, 1, 6, 23, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(adjust_to_working_hours(candidate, &c), candidate);
    }
}
