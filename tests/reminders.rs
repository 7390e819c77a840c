use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};

use tend::db;
use tend::dispatch::{FireSpec, MemoryDispatcher, NotificationDispatcher, SpoolDispatcher};
use tend::ops::{self, HabitEdit, HabitFields, TaskEdit, TaskFields};
use tend::reconcile::reconcile;
use tend::scheduler::{Outcome, Scheduler, SuppressReason};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

fn task_fields(title: &str, due_in_minutes: Option<i64>, lead: u32) -> TaskFields {
    TaskFields {
        title: Some(title.into()),
        due_date: due_in_minutes.map(|m| now() + TimeDelta::minutes(m)),
        is_priority: false,
        notification_enabled: true,
        reminder_minutes: lead,
    }
}

fn habit_fields(title: &str, target: Option<(u32, u32)>, lead: u32) -> HabitFields {
    HabitFields {
        title: Some(title.into()),
        color: None,
        target_time: target.map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap()),
        notification_enabled: true,
        reminder_minutes: lead,
    }
}

fn memory_scheduler() -> Scheduler<MemoryDispatcher> {
    Scheduler::with_clock(MemoryDispatcher::new(), Box::new(now))
}

#[test]
fn task_reminder_follows_every_edit() {
    let conn = db::open_memory().unwrap();
    let mut s = memory_scheduler();

    let task = ops::add_task(&conn, &task_fields("Submit report", Some(180), 30)).unwrap();
    let outcome = s.sync_task(&task);
    assert_eq!(
        outcome,
        Outcome::Scheduled(FireSpec::OneShot {
            at: now() + TimeDelta::minutes(150)
        })
    );
    assert_eq!(
        s.dispatcher().get(&task.id).unwrap().body,
        "Don't forget: Submit report"
    );

    // Move the due date: the old trigger is replaced, not duplicated.
    let edit = TaskEdit {
        due_date: Some(Some(now() + TimeDelta::minutes(300))),
        ..Default::default()
    };
    assert!(edit.affects_reminder());
    let task = ops::update_task(&conn, &task.id, &edit).unwrap();
    s.sync_task(&task);
    assert_eq!(s.dispatcher().len(), 1);
    assert_eq!(
        s.dispatcher().get(&task.id).unwrap().fire,
        FireSpec::OneShot {
            at: now() + TimeDelta::minutes(270)
        }
    );

    let task = ops::set_completed(&conn, &task.id, true).unwrap();
    assert_eq!(
        s.sync_task(&task),
        Outcome::Suppressed(SuppressReason::Completed)
    );
    assert!(s.dispatcher().is_empty());

    let task = ops::set_completed(&conn, &task.id, false).unwrap();
    assert!(s.sync_task(&task).is_scheduled());

    ops::remove_task(&conn, &task.id).unwrap();
    assert_eq!(s.cancel(&task.id), Outcome::Cancelled);
    assert!(s.dispatcher().is_empty());
}

#[test]
fn turning_notifications_off_cancels() {
    let conn = db::open_memory().unwrap();
    let mut s = memory_scheduler();

    let habit = ops::add_habit(&conn, &habit_fields("Stretch", Some((7, 0)), 15)).unwrap();
    assert_eq!(
        s.sync_habit(&habit),
        Outcome::Scheduled(FireSpec::Recurring { hour: 6, minute: 45 })
    );

    let habit = ops::update_habit(
        &conn,
        &habit.id,
        &HabitEdit {
            notification_enabled: Some(false),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(
        s.sync_habit(&habit),
        Outcome::Suppressed(SuppressReason::Disabled)
    );
    assert!(s.dispatcher().get(&habit.id).is_none());
}

#[test]
fn restore_rebuilds_the_same_pending_set() {
    let conn = db::open_memory().unwrap();

    let keep = ops::add_task(&conn, &task_fields("Call dentist", Some(24 * 60), 60)).unwrap();
    // Lead window already passed: eligible for restore but never scheduled.
    let late = ops::add_task(&conn, &task_fields("Water plants", Some(10), 30)).unwrap();
    let done = ops::add_task(&conn, &task_fields("Old chore", Some(120), 30)).unwrap();
    ops::set_completed(&conn, &done.id, true).unwrap();
    let mut quiet = task_fields("Quiet", Some(120), 30);
    quiet.notification_enabled = false;
    ops::add_task(&conn, &quiet).unwrap();
    ops::add_task(&conn, &task_fields("Overdue", Some(-60), 0)).unwrap();

    let evening = ops::add_habit(&conn, &habit_fields("Read", None, 15)).unwrap();
    let morning = ops::add_habit(&conn, &habit_fields("Run", Some((0, 10)), 30)).unwrap();

    let mut s = memory_scheduler();
    let report = reconcile(&conn, &mut s);
    assert!(report.authorized);
    assert!(report.errors.is_empty());
    assert_eq!(report.tasks, 2);
    assert_eq!(report.habits, 2);

    let first = s.dispatcher().pending().unwrap();
    let ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(first.len(), 3);
    assert!(ids.contains(&keep.id.as_str()));
    assert!(!ids.contains(&late.id.as_str()));
    assert_eq!(
        s.dispatcher().get(&evening.id).unwrap().fire,
        FireSpec::Recurring { hour: 19, minute: 45 }
    );
    assert_eq!(
        s.dispatcher().get(&morning.id).unwrap().fire,
        FireSpec::Recurring { hour: 23, minute: 40 }
    );

    // A fresh process starts with nothing and converges to the same set.
    let mut restarted = memory_scheduler();
    reconcile(&conn, &mut restarted);
    assert_eq!(restarted.dispatcher().pending().unwrap(), first);

    // Running it again changes nothing.
    reconcile(&conn, &mut restarted);
    assert_eq!(restarted.dispatcher().pending().unwrap(), first);
}

#[test]
fn denied_authorization_never_fails_the_caller() {
    let conn = db::open_memory().unwrap();
    let task = ops::add_task(&conn, &task_fields("Pay bill", Some(600), 30)).unwrap();

    let mut s = Scheduler::with_clock(MemoryDispatcher::denied(), Box::new(now));
    let report = reconcile(&conn, &mut s);
    assert!(!report.authorized);
    assert!(report.errors.is_empty());
    assert!(s.dispatcher().is_empty());

    assert!(matches!(s.sync_task(&task), Outcome::Failed(_)));
    // The record itself is untouched.
    assert_eq!(ops::get_task(&conn, &task.id).unwrap(), task);
}

#[test]
fn bulk_lead_time_reaches_every_open_task() {
    let conn = db::open_memory().unwrap();
    let a = ops::add_task(&conn, &task_fields("A", Some(240), 30)).unwrap();
    let mut off = task_fields("B", Some(240), 30);
    off.notification_enabled = false;
    let b = ops::add_task(&conn, &off).unwrap();
    let c = ops::add_task(&conn, &task_fields("C", Some(240), 30)).unwrap();
    ops::set_completed(&conn, &c.id, true).unwrap();

    let mut s = memory_scheduler();
    assert_eq!(s.apply_lead_time_to_all_tasks(&conn, 120).unwrap(), 2);

    let at = now() + TimeDelta::minutes(120);
    assert_eq!(
        s.dispatcher().get(&a.id).unwrap().fire,
        FireSpec::OneShot { at }
    );
    assert_eq!(
        s.dispatcher().get(&b.id).unwrap().fire,
        FireSpec::OneShot { at }
    );
    assert!(s.dispatcher().get(&c.id).is_none());

    // The stored lead time is left alone.
    assert_eq!(ops::get_task(&conn, &a.id).unwrap().reminder_minutes, 30);
}

#[test]
fn spool_survives_a_restart_and_delivers() {
    let dir = tempfile::tempdir().unwrap();
    let spool = dir.path().join("notifications.json");
    let conn = db::open_memory().unwrap();
    let task = ops::add_task(&conn, &task_fields("Ship it", Some(90), 30)).unwrap();

    {
        let mut s = Scheduler::with_clock(SpoolDispatcher::new(&spool), Box::new(now));
        reconcile(&conn, &mut s);
    }

    let mut reader = SpoolDispatcher::new(&spool);
    assert_eq!(reader.pending().unwrap().len(), 1);
    assert!(reader.take_due(now()).unwrap().is_empty());

    let due = reader.take_due(now() + TimeDelta::minutes(61)).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, task.id);
    assert_eq!(due[0].title, "Task reminder");
    assert!(reader.pending().unwrap().is_empty());
}
