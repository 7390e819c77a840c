//! Run a [`Scheduler`] on its own thread so every reminder change goes
//! through a single owner, in the order it was submitted.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use log::debug;

use crate::dispatch::NotificationDispatcher;
use crate::model::{Habit, Task};
use crate::scheduler::{Outcome, Scheduler};

enum Command {
    ScheduleTask(Task, u32),
    ScheduleHabit(Habit, u32),
    SyncTask(Task),
    SyncHabit(Habit),
    Cancel(String),
    CancelAll,
}

struct Envelope {
    command: Command,
    reply: Sender<Outcome>,
}

pub struct SchedulerHandle {
    tx: Option<Sender<Envelope>>,
    thread: Option<JoinHandle<()>>,
}

fn run<D: NotificationDispatcher>(mut scheduler: Scheduler<D>, rx: Receiver<Envelope>) {
    while let Ok(Envelope { command, reply }) = rx.recv() {
        let outcome = match command {
            Command::ScheduleTask(task, lead) => scheduler.schedule_for_task(&task, lead),
            Command::ScheduleHabit(habit, lead) => scheduler.schedule_for_habit(&habit, lead),
            Command::SyncTask(task) => scheduler.sync_task(&task),
            Command::SyncHabit(habit) => scheduler.sync_habit(&habit),
            Command::Cancel(id) => scheduler.cancel(&id),
            Command::CancelAll => scheduler.cancel_all(),
        };
        // Caller may have stopped waiting
        let _ = reply.send(outcome);
    }
    debug!("scheduler thread exiting");
}

impl SchedulerHandle {
    pub fn spawn<D>(scheduler: Scheduler<D>) -> Result<Self>
    where
        D: NotificationDispatcher + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("reminder-scheduler".into())
            .spawn(move || run(scheduler, rx))
            .context("failed to spawn scheduler thread")?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queue a command without waiting. The receiver yields its outcome.
    fn submit(&self, command: Command) -> Result<Receiver<Outcome>> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .as_ref()
            .ok_or_else(|| anyhow!("scheduler thread has stopped"))?
            .send(Envelope { command, reply })
            .map_err(|_| anyhow!("scheduler thread has stopped"))?;
        Ok(rx)
    }

    fn call(&self, command: Command) -> Result<Outcome> {
        self.submit(command)?
            .recv()
            .map_err(|_| anyhow!("scheduler thread has stopped"))
    }

    pub fn schedule_task(&self, task: Task, lead_minutes: u32) -> Result<Outcome> {
        self.call(Command::ScheduleTask(task, lead_minutes))
    }

    pub fn schedule_habit(&self, habit: Habit, lead_minutes: u32) -> Result<Outcome> {
        self.call(Command::ScheduleHabit(habit, lead_minutes))
    }

    pub fn sync_task(&self, task: Task) -> Result<Outcome> {
        self.call(Command::SyncTask(task))
    }

    pub fn sync_habit(&self, habit: Habit) -> Result<Outcome> {
        self.call(Command::SyncHabit(habit))
    }

    pub fn cancel(&self, id: &str) -> Result<Outcome> {
        self.call(Command::Cancel(id.to_string()))
    }

    pub fn cancel_all(&self) -> Result<Outcome> {
        self.call(Command::CancelAll)
    }

    /// Queue a task sync and return immediately.
    pub fn sync_task_later(&self, task: Task) -> Result<Receiver<Outcome>> {
        self.submit(Command::SyncTask(task))
    }

    /// Stop accepting commands and wait for queued ones to finish.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        drop(self.tx.take());
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| anyhow!("scheduler thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
