use anyhow::Result;
use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id                   TEXT PRIMARY KEY,
    title                TEXT,
    due_date             TEXT,
    completed            INTEGER NOT NULL DEFAULT 0 CHECK(completed IN (0, 1)),
    is_priority          INTEGER NOT NULL DEFAULT 0 CHECK(is_priority IN (0, 1)),
    notification_enabled INTEGER NOT NULL DEFAULT 0 CHECK(notification_enabled IN (0, 1)),
    reminder_minutes     INTEGER NOT NULL DEFAULT 30 CHECK(reminder_minutes >= 0),
    created_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    updated_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE INDEX IF NOT EXISTS tasks_due ON tasks(due_date) WHERE completed = 0;

CREATE TABLE IF NOT EXISTS habits (
    id                   TEXT PRIMARY KEY,
    title                TEXT,
    color                TEXT,
    target_time          TEXT CHECK(target_time IS NULL OR target_time GLOB '[0-2][0-9]:[0-5][0-9]'),
    notification_enabled INTEGER NOT NULL DEFAULT 0 CHECK(notification_enabled IN (0, 1)),
    reminder_minutes     INTEGER NOT NULL DEFAULT 15 CHECK(reminder_minutes >= 0),
    created_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    updated_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS habit_completions (
    id    TEXT PRIMARY KEY,
    habit TEXT NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
    date  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS habit_completions_habit ON habit_completions(habit, date);
";

fn set_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    set_pragmas(&conn)?;
    Ok(conn)
}

pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    set_pragmas(&conn)?;
    init(&conn)?;
    Ok(conn)
}
