mod cli;

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use log::warn;
use rusqlite::Connection;

use cli::{Cli, Command, HabitCommand, ReminderCommand, TaskCommand};
use tend::config::{self, Config};
use tend::dispatch::{NotificationDispatcher, NotificationRequest, SpoolDispatcher};
use tend::ops::{self, HabitEdit, HabitFields, TaskEdit, TaskFields};
use tend::output::{self, short_id, HabitDetail, TaskDetail};
use tend::reconcile::reconcile;
use tend::scheduler::{Outcome, Scheduler};
use tend::validate::{
    parse_due_date, parse_time_of_day, validate_reminder_minutes, REMINDER_PRESETS,
};
use tend::{db, watch};

fn ensure_parent_dir(path: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn open_db(db_path: &str) -> Result<Connection> {
    let conn = db::open(db_path)?;
    db::init(&conn)?;
    Ok(conn)
}

fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .init();
}

/// Tell the user what happened to the reminder. Never fails the command:
/// the record change has already been saved.
fn report(label: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Failed(_) => eprintln!("warning: {label}: {outcome}"),
        _ => eprintln!("{label}: {outcome}"),
    }
}

fn find_pending(
    scheduler: &Scheduler<SpoolDispatcher>,
    id: &str,
) -> Result<Option<NotificationRequest>> {
    Ok(scheduler
        .dispatcher()
        .pending()?
        .into_iter()
        .find(|r| r.id == id))
}

fn main() {
    setup_logging();
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    let db_path = config::db_path(cli.db);
    let spool_path = config::spool_path(cli.spool);
    ensure_parent_dir(&db_path)?;
    ensure_parent_dir(&spool_path)?;

    let dispatcher = SpoolDispatcher::new(&spool_path).deny(config.reminders.deny);
    let mut scheduler = Scheduler::new(dispatcher);

    match cli.command {
        Command::Init => {
            open_db(&db_path)?;
            eprintln!("Initialized {db_path}");
        }

        Command::Task(command) => run_task(command, &db_path, &config, &mut scheduler)?,

        Command::Habit(command) => run_habit(command, &db_path, &config, &mut scheduler)?,

        Command::Reminders(command) => {
            run_reminders(command, &db_path, &config, &mut scheduler)?
        }

        Command::Restore => {
            let conn = open_db(&db_path)?;
            let restored = reconcile(&conn, &mut scheduler);
            if !restored.authorized {
                eprintln!("warning: notifications are not authorized");
            }
            eprintln!(
                "Restored {} task reminders and {} habit reminders",
                restored.tasks, restored.habits
            );
            if !restored.errors.is_empty() {
                for e in &restored.errors {
                    eprintln!("error: {e}");
                }
                bail!("{} reminder queries failed", restored.errors.len());
            }
        }

        Command::Deliver {
            poll_interval,
            once,
        } => deliver(scheduler.into_dispatcher(), poll_interval, once)?,
    }

    Ok(())
}

fn run_task(
    command: TaskCommand,
    db_path: &str,
    config: &Config,
    scheduler: &mut Scheduler<SpoolDispatcher>,
) -> Result<()> {
    let conn = open_db(db_path)?;
    match command {
        TaskCommand::Add {
            title,
            due,
            priority,
            notify,
        } => {
            let due_date = due
                .map(|d| parse_due_date(&d, Local::now()))
                .transpose()?;
            let task = ops::add_task(
                &conn,
                &TaskFields {
                    title: Some(title),
                    due_date,
                    is_priority: priority,
                    notification_enabled: notify.enabled().unwrap_or(false),
                    reminder_minutes: notify.minutes.unwrap_or(config.reminders.task_minutes),
                },
            )?;
            println!("{}", task.id);
            eprintln!("Added task {}", short_id(&task.id));
            if task.notification_enabled {
                report("reminder", &scheduler.sync_task(&task));
            }
        }

        TaskCommand::Edit {
            id,
            title,
            due,
            clear_due,
            priority,
            notify,
        } => {
            let id = ops::resolve_task_id(&conn, &id)?;
            let due_date = if clear_due {
                Some(None)
            } else {
                due.map(|d| parse_due_date(&d, Local::now()))
                    .transpose()?
                    .map(Some)
            };
            let edit = TaskEdit {
                title,
                due_date,
                is_priority: priority,
                notification_enabled: notify.enabled(),
                reminder_minutes: notify.minutes,
            };
            let task = ops::update_task(&conn, &id, &edit)?;
            eprintln!("Updated task {}", short_id(&id));
            if edit.affects_reminder() {
                report("reminder", &scheduler.sync_task(&task));
            }
        }

        TaskCommand::Done { id } => {
            let id = ops::resolve_task_id(&conn, &id)?;
            let task = ops::set_completed(&conn, &id, true)?;
            eprintln!("Marked {} as done", short_id(&id));
            report("reminder", &scheduler.sync_task(&task));
        }

        TaskCommand::Reopen { id } => {
            let id = ops::resolve_task_id(&conn, &id)?;
            let task = ops::set_completed(&conn, &id, false)?;
            eprintln!("Reopened {}", short_id(&id));
            report("reminder", &scheduler.sync_task(&task));
        }

        TaskCommand::Rm { id } => {
            let id = ops::resolve_task_id(&conn, &id)?;
            ops::remove_task(&conn, &id)?;
            eprintln!("Removed task {}", short_id(&id));
            report("reminder", &scheduler.cancel(&id));
        }

        TaskCommand::Show { id, json } => {
            let id = ops::resolve_task_id(&conn, &id)?;
            let task = ops::get_task(&conn, &id)?;
            let reminder = find_pending(scheduler, &id)?;
            if json {
                let detail = TaskDetail {
                    task: &task,
                    reminder: reminder.as_ref(),
                };
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print!(
                    "{}",
                    output::format_task_detail(&task, reminder.as_ref(), &Local)
                );
            }
        }

        TaskCommand::List { all, json } => {
            let tasks = ops::list_tasks(&conn, all)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print!("{}", output::format_task_list(&tasks, &Local));
            }
        }
    }
    Ok(())
}

fn run_habit(
    command: HabitCommand,
    db_path: &str,
    config: &Config,
    scheduler: &mut Scheduler<SpoolDispatcher>,
) -> Result<()> {
    let conn = open_db(db_path)?;
    match command {
        HabitCommand::Add {
            title,
            at,
            color,
            notify,
        } => {
            let target_time = at.as_deref().map(parse_time_of_day).transpose()?;
            let habit = ops::add_habit(
                &conn,
                &HabitFields {
                    title: Some(title),
                    color,
                    target_time,
                    notification_enabled: notify.enabled().unwrap_or(false),
                    reminder_minutes: notify.minutes.unwrap_or(config.reminders.habit_minutes),
                },
            )?;
            println!("{}", habit.id);
            eprintln!("Added habit {}", short_id(&habit.id));
            if habit.notification_enabled {
                report("reminder", &scheduler.sync_habit(&habit));
            }
        }

        HabitCommand::Edit {
            id,
            title,
            at,
            clear_at,
            color,
            notify,
        } => {
            let id = ops::resolve_habit_id(&conn, &id)?;
            let target_time = if clear_at {
                Some(None)
            } else {
                at.as_deref()
                    .map(parse_time_of_day)
                    .transpose()?
                    .map(Some)
            };
            let edit = HabitEdit {
                title,
                color,
                target_time,
                notification_enabled: notify.enabled(),
                reminder_minutes: notify.minutes,
            };
            let habit = ops::update_habit(&conn, &id, &edit)?;
            eprintln!("Updated habit {}", short_id(&id));
            if edit.affects_reminder() {
                report("reminder", &scheduler.sync_habit(&habit));
            }
        }

        HabitCommand::Rm { id } => {
            let id = ops::resolve_habit_id(&conn, &id)?;
            ops::remove_habit(&conn, &id)?;
            eprintln!("Removed habit {}", short_id(&id));
            report("reminder", &scheduler.cancel(&id));
        }

        HabitCommand::Check { id } => {
            let id = ops::resolve_habit_id(&conn, &id)?;
            ops::record_completion(&conn, &id, Utc::now())?;
            eprintln!("Checked off {}", short_id(&id));
        }

        HabitCommand::History { id, json } => {
            let id = ops::resolve_habit_id(&conn, &id)?;
            let habit = ops::get_habit(&conn, &id)?;
            let completions = ops::list_completions(&conn, &id)?;
            let reminder = find_pending(scheduler, &id)?;
            if json {
                let detail = HabitDetail {
                    habit: &habit,
                    reminder: reminder.as_ref(),
                    completions: &completions,
                };
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print!(
                    "{}",
                    output::format_habit_detail(&habit, reminder.as_ref(), &completions, &Local)
                );
            }
        }

        HabitCommand::List { json } => {
            let habits = ops::list_habits(&conn)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&habits)?);
            } else {
                print!("{}", output::format_habit_list(&habits));
            }
        }
    }
    Ok(())
}

fn run_reminders(
    command: ReminderCommand,
    db_path: &str,
    config: &Config,
    scheduler: &mut Scheduler<SpoolDispatcher>,
) -> Result<()> {
    match command {
        ReminderCommand::ApplyTasks { minutes } => {
            let conn = open_db(db_path)?;
            let minutes = minutes.unwrap_or(config.reminders.task_minutes);
            validate_reminder_minutes(minutes)?;
            let n = scheduler.apply_lead_time_to_all_tasks(&conn, minutes)?;
            eprintln!(
                "Applied a {} reminder to {n} tasks",
                output::format_minutes(minutes)
            );
        }

        ReminderCommand::ApplyHabits { minutes } => {
            let conn = open_db(db_path)?;
            let minutes = minutes.unwrap_or(config.reminders.habit_minutes);
            validate_reminder_minutes(minutes)?;
            let n = scheduler.apply_lead_time_to_all_habits(&conn, minutes)?;
            eprintln!(
                "Applied a {} reminder to {n} habits",
                output::format_minutes(minutes)
            );
        }

        ReminderCommand::Clear => {
            report("reminders", &scheduler.cancel_all());
        }

        ReminderCommand::Pending { json } => {
            let pending = scheduler.dispatcher().pending()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pending)?);
            } else {
                print!("{}", output::format_pending(&pending, &Local));
            }
        }

        ReminderCommand::Status => {
            println!("{}", scheduler.dispatcher().authorization_status()?);
            let presets: Vec<String> = REMINDER_PRESETS
                .iter()
                .map(|&m| output::format_minutes(m))
                .collect();
            eprintln!(
                "Defaults: tasks {}, habits {} (presets: {})",
                output::format_minutes(config.reminders.task_minutes),
                output::format_minutes(config.reminders.habit_minutes),
                presets.join(", ")
            );
        }
    }
    Ok(())
}

/// Stand-in for the OS delivering notifications: print each request as it
/// comes due.
fn deliver(mut spool: SpoolDispatcher, poll_interval: u64, once: bool) -> Result<()> {
    let poll = Duration::from_millis(poll_interval);
    let watcher = if once {
        None
    } else {
        match watch::watch_spool(spool.path()) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("spool watcher unavailable, polling every {poll_interval}ms: {e:#}");
                None
            }
        }
    };
    let rx = watcher.as_ref().map(|(_, rx)| rx);

    loop {
        for request in spool.take_due(Local::now())? {
            println!("{}", output::format_delivery(&request));
        }
        if once {
            return Ok(());
        }

        let wait = match spool.next_due(&Local)? {
            Some(next) => (next - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .clamp(Duration::from_secs(1), poll.max(Duration::from_secs(1))),
            None => poll,
        };
        if watch::wait_or_sleep(rx, wait) {
            if let Some(rx) = rx {
                watch::drain_events(rx);
            }
        }
    }
}
