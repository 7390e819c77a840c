//! Rebuild every reminder from the record store at startup.
//!
//! Whatever the dispatcher still holds from an earlier run is not trusted.
//! Each eligible record is rescheduled from scratch, and since every
//! scheduling call cancels before it registers, running this twice is the
//! same as running it once.

use log::{error, info, warn};

use crate::dispatch::NotificationDispatcher;
use crate::scheduler::Scheduler;
use crate::store::{HabitQuery, RecordStore, TaskQuery};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub authorized: bool,
    /// Scheduling calls issued for tasks.
    pub tasks: usize,
    /// Scheduling calls issued for habits.
    pub habits: usize,
    pub errors: Vec<String>,
}

pub fn reconcile<S, D>(store: &S, scheduler: &mut Scheduler<D>) -> ReconcileReport
where
    S: RecordStore + ?Sized,
    D: NotificationDispatcher,
{
    let mut report = ReconcileReport::default();

    match scheduler.dispatcher_mut().request_authorization() {
        Ok(granted) => {
            info!(
                "notification authorization {}",
                if granted { "granted" } else { "denied" }
            );
            report.authorized = granted;
        }
        Err(e) => warn!("notification authorization request failed: {e:#}"),
    }

    let now = scheduler.now();
    match store.fetch_tasks(&TaskQuery::ReminderEligible { now }) {
        Ok(tasks) => {
            for task in &tasks {
                scheduler.schedule_for_task(task, task.reminder_minutes);
            }
            report.tasks = tasks.len();
            info!("restored {} task reminders", tasks.len());
        }
        Err(e) => {
            error!("failed to restore task reminders: {e:#}");
            report.errors.push(format!("tasks: {e:#}"));
        }
    }

    match store.fetch_habits(&HabitQuery::NotificationsEnabled) {
        Ok(habits) => {
            for habit in &habits {
                scheduler.schedule_for_habit(habit, habit.reminder_minutes);
            }
            report.habits = habits.len();
            info!("restored {} habit reminders", habits.len());
        }
        Err(e) => {
            error!("failed to restore habit reminders: {e:#}");
            report.errors.push(format!("habits: {e:#}"));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::dispatch::{Call, FireSpec, MemoryDispatcher, NotificationRequest};
    use crate::model::{Habit, Task};
    use crate::ops::{self, HabitFields, TaskFields};
    use anyhow::{bail, Result};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use rusqlite::Connection;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
    }

    fn scheduler() -> Scheduler<MemoryDispatcher> {
        Scheduler::with_clock(MemoryDispatcher::new(), Box::new(now))
    }

    fn add_task(conn: &Connection, title: &str, due_in_hours: i64, enabled: bool) -> Task {
        ops::add_task(
            conn,
            &TaskFields {
                title: Some(title.into()),
                due_date: Some(now() + TimeDelta::hours(due_in_hours)),
                notification_enabled: enabled,
                reminder_minutes: 30,
                ..TaskFields::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn schedules_only_eligible_tasks() {
        let conn = db::open_memory().unwrap();
        for i in 0..3 {
            add_task(&conn, &format!("eligible-{i}"), 2 + i, true);
        }
        let done = add_task(&conn, "completed", 4, true);
        ops::set_completed(&conn, &done.id, true).unwrap();
        add_task(&conn, "overdue", -1, true);

        let mut s = scheduler();
        let report = reconcile(&conn, &mut s);
        assert_eq!(report.tasks, 3);
        assert_eq!(report.habits, 0);
        assert!(report.errors.is_empty());
        assert_eq!(s.dispatcher().schedule_calls(), 3);
        assert_eq!(s.dispatcher().len(), 3);
    }

    #[test]
    fn schedules_enabled_habits_with_their_lead() {
        let conn = db::open_memory().unwrap();
        let on = ops::add_habit(
            &conn,
            &HabitFields {
                title: Some("stretch".into()),
                notification_enabled: true,
                reminder_minutes: 10,
                ..HabitFields::default()
            },
        )
        .unwrap();
        ops::add_habit(
            &conn,
            &HabitFields {
                title: Some("journal".into()),
                ..HabitFields::default()
            },
        )
        .unwrap();

        let mut s = scheduler();
        let report = reconcile(&conn, &mut s);
        assert_eq!(report.habits, 1);
        assert_eq!(
            s.dispatcher().get(&on.id).unwrap().fire,
            FireSpec::Recurring { hour: 19, minute: 50 }
        );
    }

    #[test]
    fn running_twice_is_idempotent() {
        let conn = db::open_memory().unwrap();
        add_task(&conn, "a", 3, true);
        add_task(&conn, "b", 5, true);

        let mut s = scheduler();
        reconcile(&conn, &mut s);
        let first = s.dispatcher().pending().unwrap();
        reconcile(&conn, &mut s);
        assert_eq!(s.dispatcher().pending().unwrap(), first);
    }

    #[test]
    fn stale_requests_for_eligible_records_are_replaced() {
        let conn = db::open_memory().unwrap();
        let task = add_task(&conn, "a", 3, true);

        let mut dispatcher = MemoryDispatcher::new();
        dispatcher.preload(NotificationRequest {
            id: task.id.clone(),
            fire: FireSpec::OneShot { at: now() },
            title: "stale".into(),
            body: "stale".into(),
        });
        let mut s = Scheduler::with_clock(dispatcher, Box::new(now));
        reconcile(&conn, &mut s);

        let pending = s.dispatcher().get(&task.id).unwrap();
        assert_eq!(
            pending.fire,
            FireSpec::OneShot {
                at: now() + TimeDelta::minutes(150)
            }
        );
        assert_eq!(
            &s.dispatcher().calls()[..2],
            &[Call::Cancel(task.id.clone()), Call::Schedule(task.id.clone())]
        );
    }

    #[test]
    fn denied_authorization_still_reconciles() {
        let conn = db::open_memory().unwrap();
        add_task(&conn, "a", 3, true);
        let mut s = Scheduler::with_clock(MemoryDispatcher::denied(), Box::new(now));
        let report = reconcile(&conn, &mut s);
        assert!(!report.authorized);
        assert_eq!(report.tasks, 1);
        assert!(s.dispatcher().is_empty());
    }

    struct BrokenTasks(Connection);

    impl RecordStore for BrokenTasks {
        fn fetch_tasks(&self, _query: &TaskQuery) -> Result<Vec<Task>> {
            bail!("disk on fire")
        }

        fn fetch_habits(&self, query: &HabitQuery) -> Result<Vec<Habit>> {
            self.0.fetch_habits(query)
        }
    }

    #[test]
    fn task_fetch_failure_does_not_block_habits() {
        let conn = db::open_memory().unwrap();
        ops::add_habit(
            &conn,
            &HabitFields {
                title: Some("walk".into()),
                notification_enabled: true,
                ..HabitFields::default()
            },
        )
        .unwrap();
        let store = BrokenTasks(conn);

        let mut s = scheduler();
        let report = reconcile(&store, &mut s);
        assert_eq!(report.tasks, 0);
        assert_eq!(report.habits, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("disk on fire"));
    }
}
