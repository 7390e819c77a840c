use anyhow::{bail, Result};
use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::model::{Habit, HabitCompletion, Task};
use crate::store::{
    format_clock, format_timestamp, get_timestamp, read_habit_row, read_task_row, HABIT_COLUMNS,
    TASK_COLUMNS,
};
use crate::validate::{validate_color, validate_reminder_minutes, validate_title};

/// Fields for a new task.
#[derive(Debug, Clone, Default)]
pub struct TaskFields {
    pub title: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub is_priority: bool,
    pub notification_enabled: bool,
    pub reminder_minutes: u32,
}

/// A partial task update; `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    /// `Some(None)` clears the due date.
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub is_priority: Option<bool>,
    pub notification_enabled: Option<bool>,
    pub reminder_minutes: Option<u32>,
}

impl TaskEdit {
    /// Whether the edit touches a field the reminder depends on.
    pub fn affects_reminder(&self) -> bool {
        self.title.is_some()
            || self.due_date.is_some()
            || self.notification_enabled.is_some()
            || self.reminder_minutes.is_some()
    }
}

/// Fields for a new habit.
#[derive(Debug, Clone, Default)]
pub struct HabitFields {
    pub title: Option<String>,
    pub color: Option<String>,
    pub target_time: Option<NaiveTime>,
    pub notification_enabled: bool,
    pub reminder_minutes: u32,
}

/// A partial habit update; `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct HabitEdit {
    pub title: Option<String>,
    pub color: Option<String>,
    /// `Some(None)` clears the target time, falling back to the default.
    pub target_time: Option<Option<NaiveTime>>,
    pub notification_enabled: Option<bool>,
    pub reminder_minutes: Option<u32>,
}

impl HabitEdit {
    pub fn affects_reminder(&self) -> bool {
        self.title.is_some()
            || self.target_time.is_some()
            || self.notification_enabled.is_some()
            || self.reminder_minutes.is_some()
    }
}

const INSERT_TASK: &str = "
INSERT INTO tasks (id, title, due_date, is_priority, notification_enabled, reminder_minutes)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
";

const SET_COMPLETED: &str = "
UPDATE tasks
SET completed = ?1,
    updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
WHERE id = ?2
";

const INSERT_HABIT: &str = "
INSERT INTO habits (id, title, color, target_time, notification_enabled, reminder_minutes)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
";

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn task_exists(conn: &Connection, id: &str) -> Result<bool> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM tasks WHERE id = ?1", [id], |row| {
            row.get(0)
        })?;
    Ok(count > 0)
}

fn require_task(conn: &Connection, id: &str) -> Result<()> {
    if !task_exists(conn, id)? {
        bail!("task '{id}' not found");
    }
    Ok(())
}

fn require_habit(conn: &Connection, id: &str) -> Result<()> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM habits WHERE id = ?1", [id], |row| {
            row.get(0)
        })?;
    if count == 0 {
        bail!("habit '{id}' not found");
    }
    Ok(())
}

/// Resolve a full id or an unambiguous prefix of one.
fn resolve_id(conn: &Connection, table: &str, kind: &str, id: &str) -> Result<String> {
    if id.is_empty() {
        bail!("{kind} id must not be empty");
    }
    // Literal prefix match
    let sql = format!("SELECT id FROM {table} WHERE substr(id, 1, length(?1)) = ?1 LIMIT 2");
    let mut stmt = conn.prepare_cached(&sql)?;
    let matches = stmt
        .query_map([id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if let Some(exact) = matches.iter().find(|m| m.as_str() == id) {
        return Ok(exact.clone());
    }
    match matches.as_slice() {
        [] => bail!("{kind} '{id}' not found"),
        [only] => Ok(only.clone()),
        _ => bail!("{kind} id '{id}' is ambiguous"),
    }
}

pub fn resolve_task_id(conn: &Connection, id: &str) -> Result<String> {
    resolve_id(conn, "tasks", "task", id)
}

pub fn resolve_habit_id(conn: &Connection, id: &str) -> Result<String> {
    resolve_id(conn, "habits", "habit", id)
}

pub fn add_task(conn: &Connection, fields: &TaskFields) -> Result<Task> {
    if let Some(title) = &fields.title {
        validate_title(title)?;
    }
    validate_reminder_minutes(fields.reminder_minutes)?;
    let id = new_id();
    conn.execute(
        INSERT_TASK,
        rusqlite::params![
            id,
            fields.title,
            fields.due_date.map(format_timestamp),
            fields.is_priority,
            fields.notification_enabled,
            fields.reminder_minutes,
        ],
    )?;
    get_task(conn, &id)
}

pub fn get_task(conn: &Connection, id: &str) -> Result<Task> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    let task = conn
        .query_row(&sql, [id], read_task_row)
        .optional()?;
    match task {
        Some(t) => Ok(t),
        None => bail!("task '{id}' not found"),
    }
}

pub fn update_task(conn: &Connection, id: &str, edit: &TaskEdit) -> Result<Task> {
    require_task(conn, id)?;
    if let Some(title) = &edit.title {
        validate_title(title)?;
    }
    if let Some(minutes) = edit.reminder_minutes {
        validate_reminder_minutes(minutes)?;
    }

    let tx = conn.unchecked_transaction()?;
    if let Some(title) = &edit.title {
        tx.execute(
            "UPDATE tasks SET title = ?1 WHERE id = ?2",
            rusqlite::params![title, id],
        )?;
    }
    if let Some(due) = edit.due_date {
        tx.execute(
            "UPDATE tasks SET due_date = ?1 WHERE id = ?2",
            rusqlite::params![due.map(format_timestamp), id],
        )?;
    }
    if let Some(priority) = edit.is_priority {
        tx.execute(
            "UPDATE tasks SET is_priority = ?1 WHERE id = ?2",
            rusqlite::params![priority, id],
        )?;
    }
    if let Some(enabled) = edit.notification_enabled {
        tx.execute(
            "UPDATE tasks SET notification_enabled = ?1 WHERE id = ?2",
            rusqlite::params![enabled, id],
        )?;
    }
    if let Some(minutes) = edit.reminder_minutes {
        tx.execute(
            "UPDATE tasks SET reminder_minutes = ?1 WHERE id = ?2",
            rusqlite::params![minutes, id],
        )?;
    }
    tx.execute(
        "UPDATE tasks SET updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') WHERE id = ?1",
        [id],
    )?;
    tx.commit()?;
    get_task(conn, id)
}

pub fn set_completed(conn: &Connection, id: &str, completed: bool) -> Result<Task> {
    require_task(conn, id)?;
    conn.execute(SET_COMPLETED, rusqlite::params![completed, id])?;
    get_task(conn, id)
}

pub fn remove_task(conn: &Connection, id: &str) -> Result<()> {
    let removed = conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
    if removed == 0 {
        bail!("task '{id}' not found");
    }
    Ok(())
}

/// Tasks ordered by due date (undated last), excluding completed unless `all`.
pub fn list_tasks(conn: &Connection, all: bool) -> Result<Vec<Task>> {
    let filter = if all { "" } else { "WHERE completed = 0" };
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks {filter} \
         ORDER BY due_date IS NULL, due_date, is_priority DESC, created_at, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], read_task_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

pub fn add_habit(conn: &Connection, fields: &HabitFields) -> Result<Habit> {
    if let Some(title) = &fields.title {
        validate_title(title)?;
    }
    if let Some(color) = &fields.color {
        validate_color(color)?;
    }
    validate_reminder_minutes(fields.reminder_minutes)?;
    let id = new_id();
    conn.execute(
        INSERT_HABIT,
        rusqlite::params![
            id,
            fields.title,
            fields.color,
            fields.target_time.map(format_clock),
            fields.notification_enabled,
            fields.reminder_minutes,
        ],
    )?;
    get_habit(conn, &id)
}

pub fn get_habit(conn: &Connection, id: &str) -> Result<Habit> {
    let sql = format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1");
    let habit = conn
        .query_row(&sql, [id], read_habit_row)
        .optional()?;
    match habit {
        Some(h) => Ok(h),
        None => bail!("habit '{id}' not found"),
    }
}

pub fn update_habit(conn: &Connection, id: &str, edit: &HabitEdit) -> Result<Habit> {
    require_habit(conn, id)?;
    if let Some(title) = &edit.title {
        validate_title(title)?;
    }
    if let Some(color) = &edit.color {
        validate_color(color)?;
    }
    if let Some(minutes) = edit.reminder_minutes {
        validate_reminder_minutes(minutes)?;
    }

    let tx = conn.unchecked_transaction()?;
    if let Some(title) = &edit.title {
        tx.execute(
            "UPDATE habits SET title = ?1 WHERE id = ?2",
            rusqlite::params![title, id],
        )?;
    }
    if let Some(color) = &edit.color {
        tx.execute(
            "UPDATE habits SET color = ?1 WHERE id = ?2",
            rusqlite::params![color, id],
        )?;
    }
    if let Some(target) = edit.target_time {
        tx.execute(
            "UPDATE habits SET target_time = ?1 WHERE id = ?2",
            rusqlite::params![target.map(format_clock), id],
        )?;
    }
    if let Some(enabled) = edit.notification_enabled {
        tx.execute(
            "UPDATE habits SET notification_enabled = ?1 WHERE id = ?2",
            rusqlite::params![enabled, id],
        )?;
    }
    if let Some(minutes) = edit.reminder_minutes {
        tx.execute(
            "UPDATE habits SET reminder_minutes = ?1 WHERE id = ?2",
            rusqlite::params![minutes, id],
        )?;
    }
    tx.execute(
        "UPDATE habits SET updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') WHERE id = ?1",
        [id],
    )?;
    tx.commit()?;
    get_habit(conn, id)
}

/// Remove a habit along with its completions.
pub fn remove_habit(conn: &Connection, id: &str) -> Result<()> {
    let removed = conn.execute("DELETE FROM habits WHERE id = ?1", [id])?;
    if removed == 0 {
        bail!("habit '{id}' not found");
    }
    Ok(())
}

pub fn list_habits(conn: &Connection) -> Result<Vec<Habit>> {
    let sql = format!(
        "SELECT {HABIT_COLUMNS} FROM habits ORDER BY target_time IS NULL, target_time, created_at, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], read_habit_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

pub fn record_completion(
    conn: &Connection,
    habit: &str,
    date: DateTime<Utc>,
) -> Result<HabitCompletion> {
    require_habit(conn, habit)?;
    let completion = HabitCompletion {
        id: new_id(),
        habit: habit.to_string(),
        date: DateTime::parse_from_rfc3339(&format_timestamp(date))?.with_timezone(&Utc),
    };
    conn.execute(
        "INSERT INTO habit_completions (id, habit, date) VALUES (?1, ?2, ?3)",
        rusqlite::params![completion.id, completion.habit, format_timestamp(completion.date)],
    )?;
    Ok(completion)
}

/// Completions for a habit, newest first.
pub fn list_completions(conn: &Connection, habit: &str) -> Result<Vec<HabitCompletion>> {
    require_habit(conn, habit)?;
    let mut stmt = conn.prepare(
        "SELECT id, habit, date FROM habit_completions WHERE habit = ?1 ORDER BY date DESC, id",
    )?;
    let rows = stmt.query_map([habit], |row| {
        Ok(HabitCompletion {
            id: row.get(0)?,
            habit: row.get(1)?,
            date: get_timestamp(row, 2)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

pub fn remove_completion(conn: &Connection, id: &str) -> Result<()> {
    let removed = conn.execute("DELETE FROM habit_completions WHERE id = ?1", [id])?;
    if removed == 0 {
        bail!("completion '{id}' not found");
    }
    Ok(())
}
