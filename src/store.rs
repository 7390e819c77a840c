//! Read-only queries the reminder engine runs against the record store.

use anyhow::Result;
use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;

use crate::model::{Habit, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskQuery {
    /// Notifications on, not completed, due strictly after `now`.
    ReminderEligible { now: DateTime<Utc> },
    Incomplete,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HabitQuery {
    NotificationsEnabled,
    All,
}

pub trait RecordStore {
    fn fetch_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>>;
    fn fetch_habits(&self, query: &HabitQuery) -> Result<Vec<Habit>>;
}

pub(crate) const TASK_COLUMNS: &str = "id, title, due_date, completed, is_priority, \
     notification_enabled, reminder_minutes, created_at, updated_at";

pub(crate) const HABIT_COLUMNS: &str =
    "id, title, color, target_time, notification_enabled, reminder_minutes, created_at, updated_at";

/// Second-precision UTC, so string order matches time order in SQL.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn format_clock(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn get_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_opt_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(_) => get_timestamp(row, idx).map(Some),
    }
}

fn get_opt_clock(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<NaiveTime>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| NaiveTime::parse_from_str(&s, "%H:%M").map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn read_task_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        due_date: get_opt_timestamp(row, 2)?,
        completed: row.get(3)?,
        is_priority: row.get(4)?,
        notification_enabled: row.get(5)?,
        reminder_minutes: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub(crate) fn read_habit_row(row: &rusqlite::Row) -> rusqlite::Result<Habit> {
    Ok(Habit {
        id: row.get(0)?,
        title: row.get(1)?,
        color: row.get(2)?,
        target_time: get_opt_clock(row, 3)?,
        notification_enabled: row.get(4)?,
        reminder_minutes: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl RecordStore for Connection {
    fn fetch_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        let (filter, now) = match query {
            TaskQuery::ReminderEligible { now } => (
                "WHERE notification_enabled = 1 AND completed = 0 \
                 AND due_date IS NOT NULL AND due_date > ?1",
                Some(format_timestamp(*now)),
            ),
            TaskQuery::Incomplete => ("WHERE completed = 0", None),
            TaskQuery::All => ("", None),
        };
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks {filter} ORDER BY created_at, id");
        let mut stmt = self.prepare(&sql)?;
        let rows = match now {
            Some(now) => stmt.query_map([now], read_task_row)?,
            None => stmt.query_map([], read_task_row)?,
        };
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    fn fetch_habits(&self, query: &HabitQuery) -> Result<Vec<Habit>> {
        let filter = match query {
            HabitQuery::NotificationsEnabled => "WHERE notification_enabled = 1",
            HabitQuery::All => "",
        };
        let sql = format!("SELECT {HABIT_COLUMNS} FROM habits {filter} ORDER BY created_at, id");
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt.query_map([], read_habit_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }
}
