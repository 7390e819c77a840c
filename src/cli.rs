use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tend", about = "Tasks, habits and their reminders")]
pub struct Cli {
    /// Path to the SQLite database [default: ~/.tend/tend.db]
    #[arg(long, env = "TEND_DB", global = true)]
    pub db: Option<String>,

    /// Path to the notification spool [default: ~/.tend/notifications.json]
    #[arg(long, env = "TEND_SPOOL", global = true)]
    pub spool: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create database and tables (idempotent)
    Init,

    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Manage habits
    #[command(subcommand)]
    Habit(HabitCommand),

    /// Bulk reminder operations
    #[command(subcommand)]
    Reminders(ReminderCommand),

    /// Rebuild every reminder from the database
    Restore,

    /// Deliver due notifications from the spool
    Deliver {
        /// Poll interval in milliseconds
        #[arg(long, default_value = "60000")]
        poll_interval: u64,
        /// Deliver what is due now and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Args)]
pub struct NotifyArgs {
    /// Turn the reminder on
    #[arg(long, conflicts_with = "no_notify")]
    pub notify: bool,
    /// Turn the reminder off
    #[arg(long)]
    pub no_notify: bool,
    /// Minutes before the due/target time to remind
    #[arg(short, long)]
    pub minutes: Option<u32>,
}

impl NotifyArgs {
    pub fn enabled(&self) -> Option<bool> {
        match (self.notify, self.no_notify) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Add a task
    Add {
        /// Task title
        title: String,
        /// Due date: "YYYY-MM-DD HH:MM", RFC 3339, or +N[m|h|d]
        #[arg(short, long)]
        due: Option<String>,
        /// Mark as priority
        #[arg(short, long)]
        priority: bool,
        #[command(flatten)]
        notify: NotifyArgs,
    },

    /// Edit a task
    Edit {
        /// Task id (or unique prefix)
        id: String,
        /// New title
        #[arg(short, long)]
        title: Option<String>,
        /// New due date
        #[arg(short, long, conflicts_with = "clear_due")]
        due: Option<String>,
        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
        /// Set or clear priority
        #[arg(long)]
        priority: Option<bool>,
        #[command(flatten)]
        notify: NotifyArgs,
    },

    /// Mark a task as done
    Done {
        /// Task id (or unique prefix)
        id: String,
    },

    /// Reopen a completed task
    Reopen {
        /// Task id (or unique prefix)
        id: String,
    },

    /// Remove a task
    Rm {
        /// Task id (or unique prefix)
        id: String,
    },

    /// Show task details
    Show {
        /// Task id (or unique prefix)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List tasks
    List {
        /// Include completed tasks
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum HabitCommand {
    /// Add a habit
    Add {
        /// Habit title
        title: String,
        /// Target time of day (HH:MM) [default: 20:00]
        #[arg(short, long)]
        at: Option<String>,
        /// Display color
        #[arg(short, long)]
        color: Option<String>,
        #[command(flatten)]
        notify: NotifyArgs,
    },

    /// Edit a habit
    Edit {
        /// Habit id (or unique prefix)
        id: String,
        /// New title
        #[arg(short, long)]
        title: Option<String>,
        /// New target time (HH:MM)
        #[arg(short, long, conflicts_with = "clear_at")]
        at: Option<String>,
        /// Remove the target time
        #[arg(long)]
        clear_at: bool,
        /// New display color
        #[arg(short, long)]
        color: Option<String>,
        #[command(flatten)]
        notify: NotifyArgs,
    },

    /// Remove a habit and its history
    Rm {
        /// Habit id (or unique prefix)
        id: String,
    },

    /// Record a completion for today
    Check {
        /// Habit id (or unique prefix)
        id: String,
    },

    /// Show a habit with its completions
    History {
        /// Habit id (or unique prefix)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List habits
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ReminderCommand {
    /// Schedule every incomplete task with one lead time
    ApplyTasks {
        /// Lead time in minutes [default: reminders.task_minutes]
        #[arg(short, long)]
        minutes: Option<u32>,
    },

    /// Schedule every habit with one lead time
    ApplyHabits {
        /// Lead time in minutes [default: reminders.habit_minutes]
        #[arg(short, long)]
        minutes: Option<u32>,
    },

    /// Cancel every pending reminder
    Clear,

    /// List pending reminders
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show notification authorization status
    Status,
}
