//! The boundary to whatever actually delivers notifications.
//!
//! The scheduler only ever talks to a [`NotificationDispatcher`]; the CLI uses
//! the file-backed [`SpoolDispatcher`], tests use [`MemoryDispatcher`].

mod memory;
mod spool;

pub use memory::{Call, MemoryDispatcher};
pub use spool::SpoolDispatcher;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FireSpec {
    /// Fires once at a calendar minute.
    OneShot { at: DateTime<Utc> },
    /// Fires every day at a local hour:minute.
    Recurring { hour: u32, minute: u32 },
}

impl std::fmt::Display for FireSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneShot { at } => write!(f, "once at {}", at.format("%Y-%m-%d %H:%M UTC")),
            Self::Recurring { hour, minute } => write!(f, "daily at {hour:02}:{minute:02}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: String,
    pub fire: FireSpec,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    #[default]
    NotDetermined,
}

impl AuthorizationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authorized => "authorized",
            Self::Denied => "denied",
            Self::NotDetermined => "not determined",
        }
    }
}

impl std::fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait NotificationDispatcher {
    /// Ask for permission to deliver notifications. Returns whether it was granted.
    fn request_authorization(&mut self) -> Result<bool>;

    fn authorization_status(&self) -> Result<AuthorizationStatus>;

    /// Register a request, replacing any pending request with the same id.
    fn schedule(&mut self, request: NotificationRequest) -> Result<()>;

    /// Remove the pending request for `id`. Unknown ids are not an error.
    fn cancel(&mut self, id: &str) -> Result<()>;

    fn cancel_all(&mut self) -> Result<()>;

    /// Pending requests, ordered by id.
    fn pending(&self) -> Result<Vec<NotificationRequest>>;
}

impl<D: NotificationDispatcher + ?Sized> NotificationDispatcher for Box<D> {
    fn request_authorization(&mut self) -> Result<bool> {
        (**self).request_authorization()
    }

    fn authorization_status(&self) -> Result<AuthorizationStatus> {
        (**self).authorization_status()
    }

    fn schedule(&mut self, request: NotificationRequest) -> Result<()> {
        (**self).schedule(request)
    }

    fn cancel(&mut self, id: &str) -> Result<()> {
        (**self).cancel(id)
    }

    fn cancel_all(&mut self) -> Result<()> {
        (**self).cancel_all()
    }

    fn pending(&self) -> Result<Vec<NotificationRequest>> {
        (**self).pending()
    }
}
