use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime, NaiveTime, Utc};

/// Injectable wall-clock. All persisted timestamps are naive UTC, so the
/// clock hands them out that way.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Compute the next occurrence of `digest_time` ("HH:MM", UTC) strictly after
/// `now`. Exactly at the target time counts as passed, so the run moves to
/// tomorrow.
pub fn next_run_utc(now: NaiveDateTime, digest_time: &str) -> Result<NaiveDateTime> {
    let time = NaiveTime::parse_from_str(digest_time, "%H:%M")
        .with_context(|| format!("invalid digest time: {}", digest_time))?;
    let target = now.date().and_time(time);
    if now < target {
        Ok(target)
    } else {
        Ok(target + Duration::days(1))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn next_run_before_target_is_today() {
        let next = next_run_utc(dt(2026, 2, 12, 6, 0), "08:00").unwrap();
        assert_eq!(next, dt(2026, 2, 12, 8, 0));
    }

    #[test]
    fn next_run_after_target_is_tomorrow() {
        let next = next_run_utc(dt(2026, 2, 12, 10, 0), "08:00").unwrap();
        assert_eq!(next, dt(2026, 2, 13, 8, 0));
    }

    #[test]
    fn next_run_exactly_at_target_is_tomorrow() {
        let next = next_run_utc(dt(2026, 2, 12, 8, 0), "08:00").unwrap();
        assert_eq!(next, dt(2026, 2, 13, 8, 0));
    }

    #[test]
    fn next_run_crosses_midnight() {
        let next = next_run_utc(dt(2026, 2, 12, 23, 30), "00:00").unwrap();
        assert_eq!(next, dt(2026, 2, 13, 0, 0));
    }

    #[test]
    fn next_run_rejects_garbage() {
        assert!(next_run_utc(dt(2026, 2, 12, 6, 0), "eight").is_err());
        assert!(next_run_utc(dt(2026, 2, 12, 6, 0), "25:00").is_err());
    }
}
