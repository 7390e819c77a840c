use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::validate::validate_reminder_minutes;

pub const DEFAULT_TASK_MINUTES: u32 = 30;
pub const DEFAULT_HABIT_MINUTES: u32 = 15;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub reminders: ReminderConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReminderConfig {
    /// Lead time for new tasks and `reminders apply-tasks`.
    #[serde(default = "default_task_minutes")]
    pub task_minutes: u32,
    /// Lead time for new habits and `reminders apply-habits`.
    #[serde(default = "default_habit_minutes")]
    pub habit_minutes: u32,
    /// Refuse notification authorization.
    #[serde(default)]
    pub deny: bool,
}

fn default_task_minutes() -> u32 {
    DEFAULT_TASK_MINUTES
}

fn default_habit_minutes() -> u32 {
    DEFAULT_HABIT_MINUTES
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            task_minutes: DEFAULT_TASK_MINUTES,
            habit_minutes: DEFAULT_HABIT_MINUTES,
            deny: false,
        }
    }
}

fn tend_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".tend")
}

/// Resolve the database path.
/// Uses the CLI value (which also covers `TEND_DB`), falls back to `$HOME/.tend/tend.db`.
pub fn db_path(cli: Option<String>) -> String {
    cli.unwrap_or_else(|| tend_dir().join("tend.db").to_string_lossy().into_owned())
}

/// Resolve the notification spool path.
/// Uses the CLI value (which also covers `TEND_SPOOL`), falls back to
/// `$HOME/.tend/notifications.json`.
pub fn spool_path(cli: Option<String>) -> String {
    cli.unwrap_or_else(|| {
        tend_dir()
            .join("notifications.json")
            .to_string_lossy()
            .into_owned()
    })
}

impl Config {
    /// Load config from `TEND_CONFIG` or `~/.tend/config.toml`.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = std::env::var("TEND_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| tend_dir().join("config.toml"));
        Self::load_from(&path)
    }

    fn load_from(path: &Path) -> Result<Self> {
        let config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        };
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        validate_reminder_minutes(self.reminders.task_minutes)
            .with_context(|| format!("invalid reminders.task_minutes in {}", path.display()))?;
        validate_reminder_minutes(self.reminders.habit_minutes)
            .with_context(|| format!("invalid reminders.habit_minutes in {}", path.display()))?;
        Ok(())
    }
}
