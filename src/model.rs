use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;

/// Fields shared by every record that can carry a reminder.
///
/// The id doubles as the notification identifier, so a record owns at most
/// one pending trigger.
pub trait Reminder {
    fn id(&self) -> &str;
    fn title(&self) -> Option<&str>;
    fn notification_enabled(&self) -> bool;
    fn reminder_minutes(&self) -> u32;

    /// The title, if it is present and not blank.
    fn display_title(&self) -> Option<&str> {
        self.title().map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub title: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub is_priority: bool,
    pub notification_enabled: bool,
    pub reminder_minutes: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    /// Returns display icon: x=done, !=priority, .=open
    pub fn icon(&self) -> &'static str {
        if self.completed {
            "x"
        } else if self.is_priority {
            "!"
        } else {
            "."
        }
    }
}

impl Reminder for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn notification_enabled(&self) -> bool {
        self.notification_enabled
    }

    fn reminder_minutes(&self) -> u32 {
        self.reminder_minutes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Habit {
    pub id: String,
    pub title: Option<String>,
    pub color: Option<String>,
    /// Only hour and minute are meaningful.
    pub target_time: Option<NaiveTime>,
    pub notification_enabled: bool,
    pub reminder_minutes: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl Reminder for Habit {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn notification_enabled(&self) -> bool {
        self.notification_enabled
    }

    fn reminder_minutes(&self) -> u32 {
        self.reminder_minutes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HabitCompletion {
    pub id: String,
    pub habit: String,
    pub date: DateTime<Utc>,
}
