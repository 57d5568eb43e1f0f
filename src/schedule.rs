//! Loop scheduling: operating hours, adaptive poll cadence, day roll detection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use jiff::civil::Date;
use jiff::{Timestamp, Zoned};

use crate::config::{CadenceConfig, HoursConfig};
use crate::model::{MachineState, TimingEstimate};

/// Longest single sleep before the shutdown flag is checked again.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Whether `now` falls on an operating weekday between start and stop.
pub fn is_operating(hours: &HoursConfig, now: &Zoned) -> bool {
    let weekday = now.weekday().to_monday_one_offset();
    let time = now.time();
    hours.days.contains(&weekday) && time >= hours.start && time < hours.stop
}

/// How long to sleep before the next loop tick.
///
/// - outside operating hours: the non-ops interval
/// - shot imminent, or a deadline closer than the ops interval: the pre-shot interval
/// - otherwise: the ops interval
pub fn poll_interval(
    state: MachineState,
    operating: bool,
    estimate: Option<TimingEstimate>,
    now: Timestamp,
    cadence: &CadenceConfig,
) -> Duration {
    if !operating {
        return Duration::from_secs(cadence.non_ops_secs);
    }
    let ops = Duration::from_secs(cadence.ops_secs);
    let deadline_near = estimate
        .and_then(|e| e.next_deadline(now))
        .and_then(|d| Duration::try_from(d.duration_since(now)).ok())
        .is_some_and(|until| until <= ops);
    if state.is_imminent() || deadline_near {
        Duration::from_secs(cadence.preshot_secs)
    } else {
        ops
    }
}

/// Counts loop ticks and looks at the date every `every` ticks.
///
/// Counting ticks instead of arming a midnight timer means a day change
/// is noticed however long the loop slept across it.
#[derive(Debug)]
pub struct DayTicker {
    every: u32,
    ticks: u32,
    current: Option<Date>,
}

impl DayTicker {
    pub fn new(every: u32) -> Self {
        Self {
            every: every.max(1),
            ticks: 0,
            current: None,
        }
    }

    /// Advance one tick. Returns the new date when this tick detects a day change.
    ///
    /// The first tick always reports, so day folders are prepared at startup.
    pub fn tick(&mut self, today: Date) -> Option<Date> {
        let check = self.ticks % self.every == 0;
        self.ticks = self.ticks.wrapping_add(1);
        if !check || self.current == Some(today) {
            return None;
        }
        self.current = Some(today);
        Some(today)
    }
}

/// Sleep for `total`, waking early if `shutdown` is set.
/// Returns whether shutdown was requested.
pub fn sleep_unless(shutdown: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if shutdown.load(Ordering::SeqCst) {
            return true;
        }
        let slice = remaining.min(SLEEP_SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
    shutdown.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use jiff::civil;
    use jiff::tz::TimeZone;

    use crate::config::TimingConfig;

    fn zoned(date: Date, hour: i8, minute: i8) -> Zoned {
        date.at(hour, minute, 0, 0).to_zoned(TimeZone::UTC).unwrap()
    }

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_second(1_800_000_000 + secs).unwrap()
    }

    #[test]
    fn operating_hours_cover_weekday_window() {
        let hours = HoursConfig::default();
        // 2024-03-07 is a Thursday.
        let thursday = civil::date(2024, 3, 7);

        assert!(!is_operating(&hours, &zoned(thursday, 7, 49)));
        assert!(is_operating(&hours, &zoned(thursday, 7, 50)));
        assert!(is_operating(&hours, &zoned(thursday, 20, 9)));
        assert!(!is_operating(&hours, &zoned(thursday, 20, 10)));
    }

    #[test]
    fn sunday_is_not_an_operating_day() {
        let hours = HoursConfig::default();

        assert!(is_operating(&hours, &zoned(civil::date(2024, 3, 9), 12, 0)));
        assert!(!is_operating(&hours, &zoned(civil::date(2024, 3, 10), 12, 0)));
    }

    #[test]
    fn cadence_follows_state_and_hours() {
        let cadence = CadenceConfig::default();

        assert_eq!(
            poll_interval(MachineState::Idle, false, None, t(0), &cadence),
            Duration::from_secs(600)
        );
        assert_eq!(
            poll_interval(MachineState::Idle, true, None, t(0), &cadence),
            Duration::from_secs(25)
        );
        assert_eq!(
            poll_interval(MachineState::PreShot, true, None, t(0), &cadence),
            Duration::from_secs(1)
        );
        assert_eq!(
            poll_interval(MachineState::Trigger, true, None, t(0), &cadence),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn near_deadline_polls_fast() {
        let cadence = CadenceConfig::default();
        let estimate = TimingEstimate::derive(t(100), &TimingConfig::default());

        // Recording starts at t(94).
        assert_eq!(
            poll_interval(MachineState::Ready, true, Some(estimate), t(50), &cadence),
            Duration::from_secs(25)
        );
        assert_eq!(
            poll_interval(MachineState::Ready, true, Some(estimate), t(70), &cadence),
            Duration::from_secs(1)
        );
        // Every deadline has passed.
        assert_eq!(
            poll_interval(MachineState::PostShot, true, Some(estimate), t(400), &cadence),
            Duration::from_secs(25)
        );
    }

    #[test]
    fn first_tick_reports_today() {
        let mut ticker = DayTicker::new(8);
        let today = civil::date(2024, 3, 7);

        assert_eq!(ticker.tick(today), Some(today));
        assert_eq!(ticker.tick(today), None);
    }

    #[test]
    fn day_change_is_reported_once_on_a_check_tick() {
        let mut ticker = DayTicker::new(4);
        let day1 = civil::date(2024, 3, 7);
        let day2 = civil::date(2024, 3, 8);

        let mut reports = Vec::new();
        for i in 0..20 {
            let today = if i < 6 { day1 } else { day2 };
            if let Some(date) = ticker.tick(today) {
                reports.push((i, date));
            }
        }

        assert_eq!(reports, vec![(0, day1), (8, day2)]);
        assert_eq!(ticker.tick(day2), None);
    }

    #[test]
    fn sleep_returns_early_on_shutdown() {
        let shutdown = AtomicBool::new(true);
        let started = Instant::now();

        assert!(sleep_unless(&shutdown, Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_runs_to_completion_without_shutdown() {
        let shutdown = AtomicBool::new(false);

        assert!(!sleep_unless(&shutdown, Duration::from_millis(50)));
    }
}
