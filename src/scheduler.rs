//! Keeps the dispatcher's pending set in step with task and habit records.
//!
//! The scheduler holds no state besides the dispatcher handle and a clock.
//! Every operation cancels whatever is registered under the record id before
//! deciding whether to register a replacement, so repeating an operation is
//! harmless and a restart only needs to replay it (see [`crate::reconcile`]).

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::dispatch::{FireSpec, NotificationDispatcher, NotificationRequest};
use crate::model::{Habit, Reminder, Task};
use crate::store::{HabitQuery, RecordStore, TaskQuery};
use crate::trigger::{compute_habit_trigger, compute_task_trigger, TaskTrigger};

pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    MissingTitle,
    MissingDueDate,
    /// The lead window has already elapsed.
    InPast,
    Completed,
    Disabled,
}

impl SuppressReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingTitle => "no title",
            Self::MissingDueDate => "no due date",
            Self::InPast => "reminder time already passed",
            Self::Completed => "completed",
            Self::Disabled => "notifications disabled",
        }
    }
}

/// What a scheduling call left behind for the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Scheduled(FireSpec),
    Suppressed(SuppressReason),
    Cancelled,
    /// The dispatcher refused; no trigger is registered.
    Failed(String),
}

impl Outcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled(spec) => write!(f, "reminder set {spec}"),
            Self::Suppressed(reason) => write!(f, "no reminder ({})", reason.as_str()),
            Self::Cancelled => f.write_str("reminder cancelled"),
            Self::Failed(msg) => write!(f, "reminder not set: {msg}"),
        }
    }
}

pub fn task_request(task: &Task, title: &str, at: DateTime<Utc>) -> NotificationRequest {
    NotificationRequest {
        id: task.id.clone(),
        fire: FireSpec::OneShot { at },
        title: "Task reminder".into(),
        body: format!("Don't forget: {title}"),
    }
}

pub fn habit_request(habit: &Habit, title: &str, hour: u32, minute: u32) -> NotificationRequest {
    NotificationRequest {
        id: habit.id.clone(),
        fire: FireSpec::Recurring { hour, minute },
        title: "Habit reminder".into(),
        body: format!("Time to practice: {title}"),
    }
}

pub struct Scheduler<D> {
    dispatcher: D,
    clock: Clock,
}

impl<D: NotificationDispatcher> Scheduler<D> {
    pub fn new(dispatcher: D) -> Self {
        Self::with_clock(dispatcher, Box::new(Utc::now))
    }

    pub fn with_clock(dispatcher: D, clock: Clock) -> Self {
        Self { dispatcher, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    pub fn into_dispatcher(self) -> D {
        self.dispatcher
    }

    fn register(&mut self, request: NotificationRequest) -> Outcome {
        let id = request.id.clone();
        let fire = request.fire;
        match self.dispatcher.schedule(request) {
            Ok(()) => {
                info!("reminder for {id} set {fire}");
                Outcome::Scheduled(fire)
            }
            Err(e) => {
                warn!("failed to schedule reminder for {id}: {e:#}");
                Outcome::Failed(format!("{e:#}"))
            }
        }
    }

    /// Cancel, or report why the cancel failed.
    fn clear(&mut self, id: &str) -> Option<Outcome> {
        match self.dispatcher.cancel(id) {
            Ok(()) => None,
            Err(e) => {
                warn!("failed to cancel reminder for {id}: {e:#}");
                Some(Outcome::Failed(format!("{e:#}")))
            }
        }
    }

    /// Replace the task's trigger with a one-shot `lead_minutes` before it is due.
    pub fn schedule_for_task(&mut self, task: &Task, lead_minutes: u32) -> Outcome {
        if let Some(failed) = self.clear(&task.id) {
            return failed;
        }
        let Some(title) = task.display_title() else {
            debug!("no reminder for {}: {}", task.id, SuppressReason::MissingTitle.as_str());
            return Outcome::Suppressed(SuppressReason::MissingTitle);
        };
        let Some(due) = task.due_date else {
            debug!("no reminder for {}: {}", task.id, SuppressReason::MissingDueDate.as_str());
            return Outcome::Suppressed(SuppressReason::MissingDueDate);
        };
        let now = self.now();
        match compute_task_trigger(due, lead_minutes, now) {
            // Truncation to the minute can land at or before now
            TaskTrigger::Fire(at) if at > now => {
                let request = task_request(task, title, at);
                self.register(request)
            }
            TaskTrigger::Fire(_) | TaskTrigger::Suppressed => {
                debug!("no reminder for {}: {}", task.id, SuppressReason::InPast.as_str());
                Outcome::Suppressed(SuppressReason::InPast)
            }
        }
    }

    /// Replace the habit's trigger with a daily one `lead_minutes` before its target time.
    pub fn schedule_for_habit(&mut self, habit: &Habit, lead_minutes: u32) -> Outcome {
        if let Some(failed) = self.clear(&habit.id) {
            return failed;
        }
        let Some(title) = habit.display_title() else {
            debug!("no reminder for {}: {}", habit.id, SuppressReason::MissingTitle.as_str());
            return Outcome::Suppressed(SuppressReason::MissingTitle);
        };
        let at = compute_habit_trigger(habit.target_time, lead_minutes);
        let request = habit_request(habit, title, at.hour, at.minute);
        self.register(request)
    }

    pub fn cancel(&mut self, id: &str) -> Outcome {
        if let Some(failed) = self.clear(id) {
            return failed;
        }
        debug!("reminder for {id} cancelled");
        Outcome::Cancelled
    }

    pub fn cancel_all(&mut self) -> Outcome {
        match self.dispatcher.cancel_all() {
            Ok(()) => {
                info!("all reminders cancelled");
                Outcome::Cancelled
            }
            Err(e) => {
                warn!("failed to cancel all reminders: {e:#}");
                Outcome::Failed(format!("{e:#}"))
            }
        }
    }

    /// Bring the task's trigger in line with its current fields after a write.
    pub fn sync_task(&mut self, task: &Task) -> Outcome {
        let reason = if task.completed {
            SuppressReason::Completed
        } else if !task.notification_enabled {
            SuppressReason::Disabled
        } else {
            return self.schedule_for_task(task, task.reminder_minutes);
        };
        if let Some(failed) = self.clear(&task.id) {
            return failed;
        }
        debug!("no reminder for {}: {}", task.id, reason.as_str());
        Outcome::Suppressed(reason)
    }

    /// Bring the habit's trigger in line with its current fields after a write.
    pub fn sync_habit(&mut self, habit: &Habit) -> Outcome {
        if !habit.notification_enabled {
            if let Some(failed) = self.clear(&habit.id) {
                return failed;
            }
            debug!("no reminder for {}: {}", habit.id, SuppressReason::Disabled.as_str());
            return Outcome::Suppressed(SuppressReason::Disabled);
        }
        self.schedule_for_habit(habit, habit.reminder_minutes)
    }

    /// Schedule every incomplete task with the same lead time.
    ///
    /// Returns the number of tasks processed, whatever each one's outcome.
    pub fn apply_lead_time_to_all_tasks<S: RecordStore + ?Sized>(
        &mut self,
        store: &S,
        lead_minutes: u32,
    ) -> Result<usize> {
        let tasks = store.fetch_tasks(&TaskQuery::Incomplete)?;
        for task in &tasks {
            self.schedule_for_task(task, lead_minutes);
        }
        info!("applied {lead_minutes} minute lead to {} tasks", tasks.len());
        Ok(tasks.len())
    }

    /// Schedule every habit with the same lead time.
    ///
    /// Returns the number of habits processed, whatever each one's outcome.
    pub fn apply_lead_time_to_all_habits<S: RecordStore + ?Sized>(
        &mut self,
        store: &S,
        lead_minutes: u32,
    ) -> Result<usize> {
        let habits = store.fetch_habits(&HabitQuery::All)?;
        for habit in &habits {
            self.schedule_for_habit(habit, lead_minutes);
        }
        info!("applied {lead_minutes} minute lead to {} habits", habits.len());
        Ok(habits.len())
    }
}
