use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Datelike, Local, NaiveTime, TimeZone, Timelike, Weekday};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::info;

use crate::jobs;
use crate::server::AppState;

/// Poll cadence for the weekly slot check.
const WEEKLY_POLL: Duration = Duration::from_secs(300);
/// Cooldown after a weekly fire so one slot hour fires exactly once.
const WEEKLY_COOLDOWN: Duration = Duration::from_secs(3600);

/// Parse HH:MM to NaiveTime
pub fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    let parts: Vec<_> = s.split(':').collect();
    if parts.len() != 2 {
        bail!("bad time format");
    }
    let h: u32 = parts[0].parse()?;
    let m: u32 = parts[1].parse()?;
    NaiveTime::from_hms_opt(h, m, 0).context("invalid hh:mm")
}

/// Next local occurrence of `t`: later today if still ahead, else tomorrow.
pub fn next_daily_fire(now: DateTime<Local>, t: NaiveTime) -> DateTime<Local> {
    let target = if now.naive_local().time() < t {
        now.date_naive().and_time(t)
    } else {
        // succ_opt only fails at the end of the calendar
        now.date_naive().succ_opt().unwrap_or(now.date_naive()).and_time(t)
    };
    match Local.from_local_datetime(&target).earliest() {
        Some(next) => next,
        // The target landed in a DST gap; a flat day keeps the cadence.
        None => now + chrono::Duration::hours(24),
    }
}

/// Clamped wall-clock distance to the next fire.
pub fn duration_until(now: DateTime<Local>, next: DateTime<Local>) -> Duration {
    let dur = next - now;
    Duration::from_millis(dur.num_milliseconds().max(0) as u64)
}

/// True while `now` sits inside the weekly digest slot hour.
pub fn weekly_slot_matches(now: DateTime<Local>, weekday: Weekday, hour: u32) -> bool {
    now.weekday() == weekday && now.hour() == hour
}

/// Shared scheduler introspection for the health endpoint.
#[derive(Debug, Default)]
pub struct SchedStatus {
    pub next_daily_fire: RwLock<Option<DateTime<Local>>>,
    pub last_daily_run: RwLock<Option<DateTime<Local>>>,
    pub last_weekly_run: RwLock<Option<DateTime<Local>>>,
}

/// Daily evaluation loop: sleep until the configured local time, run, then
/// re-anchor to the next occurrence. Manual runs go through the HTTP surface
/// and never touch this timer.
pub async fn daily_loop(state: AppState, at: NaiveTime) {
    loop {
        let now = Local::now();
        let next = next_daily_fire(now, at);
        *state.sched.next_daily_fire.write().await = Some(next);
        let dur = duration_until(now, next);
        info!(
            "daily evaluation sleeps {}s until {}",
            dur.as_secs(),
            next.format("%Y-%m-%d %H:%M:%S")
        );
        // Overshoot the tick slightly so millisecond truncation cannot wake
        // us just before the target and double-fire.
        sleep(dur + Duration::from_millis(250)).await;

        let today = Local::now().date_naive();
        let report = jobs::run_daily(
            state.market.as_ref(),
            state.notifier.as_ref(),
            &state.store,
            &state.watchlist,
            today,
            state.days,
        )
        .await;
        state.merge_prices(&report.prices).await;
        *state.sched.last_daily_run.write().await = Some(Local::now());
    }
}

/// Weekly digest loop: wake every few minutes, fire when the local
/// weekday/hour matches, then cool down past the slot hour.
pub async fn weekly_loop(state: AppState, weekday: Weekday, hour: u32) {
    info!(
        "weekly digest armed for {:?} {:02}:00 local, polling every {}s",
        weekday,
        hour,
        WEEKLY_POLL.as_secs()
    );
    loop {
        if weekly_slot_matches(Local::now(), weekday, hour) {
            let report = jobs::run_weekly(
                state.market.as_ref(),
                state.notifier.as_ref(),
                &state.watchlist,
                state.days,
            )
            .await;
            state.merge_prices(&report.prices).await;
            *state.sched.last_weekly_run.write().await = Some(Local::now());
            sleep(WEEKLY_COOLDOWN).await;
        } else {
            sleep(WEEKLY_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn parses_hhmm() {
        assert_eq!(
            parse_hhmm("07:00").unwrap(),
            NaiveTime::from_hms_opt(7, 0, 0).unwrap()
        );
        assert!(parse_hhmm("7").is_err());
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("07:00:00").is_err());
    }

    #[test]
    fn fires_later_today_when_target_is_ahead() {
        let now = local(2026, 8, 7, 6, 30);
        let next = next_daily_fire(now, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert_eq!(next, local(2026, 8, 7, 7, 0));
    }

    #[test]
    fn fires_tomorrow_once_target_has_passed() {
        let now = local(2026, 8, 7, 7, 0);
        let next = next_daily_fire(now, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert_eq!(next, local(2026, 8, 8, 7, 0));
    }

    #[test]
    fn duration_never_goes_negative() {
        let now = local(2026, 8, 7, 9, 0);
        assert_eq!(duration_until(now, local(2026, 8, 7, 8, 0)), Duration::ZERO);
        assert_eq!(
            duration_until(now, local(2026, 8, 7, 10, 0)),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn weekly_slot_requires_day_and_hour() {
        // 2026-08-09 is a Sunday.
        assert!(weekly_slot_matches(local(2026, 8, 9, 9, 15), Weekday::Sun, 9));
        assert!(!weekly_slot_matches(local(2026, 8, 9, 10, 0), Weekday::Sun, 9));
        assert!(!weekly_slot_matches(local(2026, 8, 8, 9, 0), Weekday::Sun, 9));
    }
}
