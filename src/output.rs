use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::dispatch::{FireSpec, NotificationRequest};
use crate::model::{Habit, HabitCompletion, Task};
use crate::trigger::{compute_habit_trigger, ClockTime, DEFAULT_HABIT_TIME};

#[derive(Serialize)]
pub struct TaskDetail<'a> {
    #[serde(flatten)]
    pub task: &'a Task,
    pub reminder: Option<&'a NotificationRequest>,
}

#[derive(Serialize)]
pub struct HabitDetail<'a> {
    #[serde(flatten)]
    pub habit: &'a Habit,
    pub reminder: Option<&'a NotificationRequest>,
    pub completions: &'a [HabitCompletion],
}

/// First eight characters of an id, enough to pass back to the CLI.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Human lead time: `15 minutes`, `1 hour`, `3 hours`, `1 day`.
pub fn format_minutes(minutes: u32) -> String {
    match minutes {
        1 => "1 minute".into(),
        m if m >= 1440 && m % 1440 == 0 => plural(m / 1440, "day"),
        m if m >= 60 && m % 60 == 0 => plural(m / 60, "hour"),
        m => plural(m, "minute"),
    }
}

fn plural(n: u32, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

fn format_time<Tz: TimeZone>(t: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    t.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string()
}

fn title_or_placeholder(title: Option<&str>) -> &str {
    match title {
        Some(t) if !t.trim().is_empty() => t,
        _ => "(untitled)",
    }
}

fn format_fire<Tz: TimeZone>(fire: &FireSpec, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    match fire {
        FireSpec::OneShot { at } => format!("once at {}", format_time(*at, tz)),
        FireSpec::Recurring { hour, minute } => format!("daily at {hour:02}:{minute:02}"),
    }
}

pub fn format_task_detail<Tz: TimeZone>(
    task: &Task,
    reminder: Option<&NotificationRequest>,
    tz: &Tz,
) -> String
where
    Tz::Offset: Display,
{
    let mut out = String::new();
    out.push_str(&format!("Id:          {}\n", task.id));
    out.push_str(&format!("Title:       {}\n", title_or_placeholder(task.title.as_deref())));
    let status = if task.completed { "done" } else { "open" };
    out.push_str(&format!("Status:      {status}\n"));
    if task.is_priority {
        out.push_str("Priority:    yes\n");
    }
    if let Some(due) = task.due_date {
        out.push_str(&format!("Due:         {}\n", format_time(due, tz)));
    }
    if task.notification_enabled {
        out.push_str(&format!(
            "Notify:      {} before\n",
            format_minutes(task.reminder_minutes)
        ));
    } else {
        out.push_str("Notify:      off\n");
    }
    match reminder {
        Some(r) => out.push_str(&format!("Reminder:    {}\n", format_fire(&r.fire, tz))),
        None => out.push_str("Reminder:    none pending\n"),
    }
    out.push_str(&format!("Created:     {}\n", task.created_at));
    out.push_str(&format!("Updated:     {}\n", task.updated_at));
    out
}

pub fn format_task_list<Tz: TimeZone>(tasks: &[Task], tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let mut out = String::new();
    for task in tasks {
        let due = task
            .due_date
            .map(|d| format!("  due {}", format_time(d, tz)))
            .unwrap_or_default();
        let bell = if task.notification_enabled { "  [bell]" } else { "" };
        out.push_str(&format!(
            "{} {}  {}{}{}\n",
            task.icon(),
            short_id(&task.id),
            title_or_placeholder(task.title.as_deref()),
            due,
            bell
        ));
    }
    out
}

fn target_of(habit: &Habit) -> ClockTime {
    habit
        .target_time
        .map(ClockTime::from)
        .unwrap_or(DEFAULT_HABIT_TIME)
}

pub fn format_habit_list(habits: &[Habit]) -> String {
    let mut out = String::new();
    for habit in habits {
        let reminder = if habit.notification_enabled {
            format!(
                "  [bell {}]",
                compute_habit_trigger(habit.target_time, habit.reminder_minutes)
            )
        } else {
            String::new()
        };
        out.push_str(&format!(
            "{}  {}  at {}{}\n",
            short_id(&habit.id),
            title_or_placeholder(habit.title.as_deref()),
            target_of(habit),
            reminder
        ));
    }
    out
}

pub fn format_habit_detail<Tz: TimeZone>(
    habit: &Habit,
    reminder: Option<&NotificationRequest>,
    completions: &[HabitCompletion],
    tz: &Tz,
) -> String
where
    Tz::Offset: Display,
{
    let mut out = String::new();
    out.push_str(&format!("Id:          {}\n", habit.id));
    out.push_str(&format!("Title:       {}\n", title_or_placeholder(habit.title.as_deref())));
    if let Some(color) = &habit.color {
        out.push_str(&format!("Color:       {color}\n"));
    }
    let target = match habit.target_time {
        Some(_) => target_of(habit).to_string(),
        None => format!("{DEFAULT_HABIT_TIME} (default)"),
    };
    out.push_str(&format!("Target:      {target}\n"));
    if habit.notification_enabled {
        out.push_str(&format!(
            "Notify:      {} before\n",
            format_minutes(habit.reminder_minutes)
        ));
    } else {
        out.push_str("Notify:      off\n");
    }
    match reminder {
        Some(r) => out.push_str(&format!("Reminder:    {}\n", format_fire(&r.fire, tz))),
        None => out.push_str("Reminder:    none pending\n"),
    }
    out.push_str(&format!("Completions: {}\n", completions.len()));
    for c in completions {
        out.push_str(&format!("  {}  {}\n", short_id(&c.id), format_time(c.date, tz)));
    }
    out
}

pub fn format_pending<Tz: TimeZone>(requests: &[NotificationRequest], tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let mut out = String::new();
    for r in requests {
        out.push_str(&format!(
            "{}  {:<24}  {}\n",
            short_id(&r.id),
            format_fire(&r.fire, tz),
            r.body
        ));
    }
    out
}

pub fn format_delivery(request: &NotificationRequest) -> String {
    format!("{}: {}", request.title, request.body)
}
