//! Fire-time computation for task and habit reminders.
//!
//! Tasks get a one-shot trigger at `due - lead`, dropped entirely when that
//! instant is not in the future. Habits get a daily time-of-day trigger at
//! `target - lead`, wrapping across midnight.

use chrono::{DateTime, NaiveTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Habits without a target time are reminded relative to 20:00.
pub const DEFAULT_HABIT_TIME: ClockTime = ClockTime { hour: 20, minute: 0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTrigger {
    Fire(DateTime<Utc>),
    Suppressed,
}

/// An hour:minute on the wall clock, no date attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl ClockTime {
    fn minute_of_day(self) -> i64 {
        i64::from(self.hour) * 60 + i64::from(self.minute)
    }

    fn from_minute_of_day(m: i64) -> Self {
        let m = m.rem_euclid(MINUTES_PER_DAY);
        Self {
            hour: (m / 60) as u32,
            minute: (m % 60) as u32,
        }
    }
}

impl From<NaiveTime> for ClockTime {
    fn from(t: NaiveTime) -> Self {
        Self {
            hour: t.hour(),
            minute: t.minute(),
        }
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Drop seconds and sub-seconds; calendar triggers only carry minutes.
fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

pub fn compute_task_trigger(
    due_date: DateTime<Utc>,
    lead_minutes: u32,
    now: DateTime<Utc>,
) -> TaskTrigger {
    let Some(candidate) = due_date.checked_sub_signed(TimeDelta::minutes(i64::from(lead_minutes)))
    else {
        return TaskTrigger::Suppressed;
    };
    if candidate <= now {
        return TaskTrigger::Suppressed;
    }
    TaskTrigger::Fire(truncate_to_minute(candidate))
}

pub fn compute_habit_trigger(target_time: Option<NaiveTime>, lead_minutes: u32) -> ClockTime {
    let target = target_time.map(ClockTime::from).unwrap_or(DEFAULT_HABIT_TIME);
    ClockTime::from_minute_of_day(target.minute_of_day() - i64::from(lead_minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn task_fires_lead_minutes_before_due() {
        let now = at(8, 0, 0);
        assert_eq!(
            compute_task_trigger(at(12, 0, 0), 30, now),
            TaskTrigger::Fire(at(11, 30, 0))
        );
    }

    #[test]
    fn task_fire_time_is_truncated_to_minute() {
        let now = at(8, 0, 0);
        assert_eq!(
            compute_task_trigger(at(12, 0, 45), 15, now),
            TaskTrigger::Fire(at(11, 45, 0))
        );
    }

    #[test]
    fn task_zero_lead_fires_at_due() {
        let now = at(8, 0, 0);
        assert_eq!(
            compute_task_trigger(at(9, 0, 0), 0, now),
            TaskTrigger::Fire(at(9, 0, 0))
        );
    }

    #[test]
    fn task_in_past_is_suppressed() {
        let now = at(12, 0, 0);
        assert_eq!(
            compute_task_trigger(at(11, 0, 0), 0, now),
            TaskTrigger::Suppressed
        );
    }

    #[test]
    fn task_lead_window_elapsed_is_suppressed() {
        // Due in 20 minutes but reminder wanted 30 minutes ahead.
        let now = at(12, 0, 0);
        assert_eq!(
            compute_task_trigger(at(12, 20, 0), 30, now),
            TaskTrigger::Suppressed
        );
    }

    #[test]
    fn task_candidate_exactly_now_is_suppressed() {
        let now = at(12, 0, 0);
        assert_eq!(
            compute_task_trigger(at(12, 30, 0), 30, now),
            TaskTrigger::Suppressed
        );
    }

    #[test]
    fn task_one_day_lead() {
        let now = at(0, 0, 0);
        let due = Utc.with_ymd_and_hms(2026, 3, 16, 9, 0, 0).unwrap();
        assert_eq!(
            compute_task_trigger(due, 1440, now),
            TaskTrigger::Fire(Utc.with_ymd_and_hms(2026, 3, 15, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn habit_subtracts_lead() {
        assert_eq!(
            compute_habit_trigger(Some(hm(7, 30)), 15),
            ClockTime { hour: 7, minute: 15 }
        );
    }

    #[test]
    fn habit_wraps_past_midnight() {
        assert_eq!(
            compute_habit_trigger(Some(hm(0, 10)), 30),
            ClockTime { hour: 23, minute: 40 }
        );
    }

    #[test]
    fn habit_defaults_to_eight_pm() {
        assert_eq!(compute_habit_trigger(None, 0), DEFAULT_HABIT_TIME);
        assert_eq!(
            compute_habit_trigger(None, 60),
            ClockTime { hour: 19, minute: 0 }
        );
    }

    #[test]
    fn habit_ignores_seconds_of_target() {
        let t = NaiveTime::from_hms_opt(6, 45, 59).unwrap();
        assert_eq!(
            compute_habit_trigger(Some(t), 0),
            ClockTime { hour: 6, minute: 45 }
        );
    }

    #[test]
    fn habit_wraps_for_every_lead_in_a_day() {
        let target = hm(0, 0);
        for lead in 0..1440u32 {
            let got = compute_habit_trigger(Some(target), lead);
            let expected = (1440 - lead) % 1440;
            assert_eq!(got.hour * 60 + got.minute, expected, "lead {lead}");
        }
    }

    #[test]
    fn habit_full_day_lead_is_identity() {
        assert_eq!(
            compute_habit_trigger(Some(hm(9, 5)), 1440),
            ClockTime { hour: 9, minute: 5 }
        );
    }

    #[test]
    fn clock_time_display() {
        assert_eq!(ClockTime { hour: 7, minute: 5 }.to_string(), "07:05");
    }
}
