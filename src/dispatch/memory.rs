use std::collections::BTreeMap;

use anyhow::{bail, Result};

use super::{AuthorizationStatus, NotificationDispatcher, NotificationRequest};

/// A dispatcher call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Schedule(String),
    Cancel(String),
    CancelAll,
}

/// In-memory dispatcher that records every call.
#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    pending: BTreeMap<String, NotificationRequest>,
    calls: Vec<Call>,
    status: AuthorizationStatus,
    grant: bool,
    fail_schedule: bool,
}

impl MemoryDispatcher {
    /// A dispatcher that is already authorized.
    pub fn new() -> Self {
        Self {
            status: AuthorizationStatus::Authorized,
            grant: true,
            ..Self::default()
        }
    }

    /// A dispatcher whose user refuses notifications. Scheduling fails.
    pub fn denied() -> Self {
        Self {
            status: AuthorizationStatus::Denied,
            grant: false,
            ..Self::default()
        }
    }

    /// Make every subsequent `schedule` fail.
    pub fn fail_schedules(&mut self, fail: bool) {
        self.fail_schedule = fail;
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn schedule_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Schedule(_)))
            .count()
    }

    pub fn get(&self, id: &str) -> Option<&NotificationRequest> {
        self.pending.get(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Seed a request without recording a call, as if left over from an earlier run.
    pub fn preload(&mut self, request: NotificationRequest) {
        self.pending.insert(request.id.clone(), request);
    }
}

impl NotificationDispatcher for MemoryDispatcher {
    fn request_authorization(&mut self) -> Result<bool> {
        if self.status == AuthorizationStatus::NotDetermined {
            self.status = if self.grant {
                AuthorizationStatus::Authorized
            } else {
                AuthorizationStatus::Denied
            };
        }
        Ok(self.status == AuthorizationStatus::Authorized)
    }

    fn authorization_status(&self) -> Result<AuthorizationStatus> {
        Ok(self.status)
    }

    fn schedule(&mut self, request: NotificationRequest) -> Result<()> {
        self.calls.push(Call::Schedule(request.id.clone()));
        if self.fail_schedule {
            bail!("scheduling failed for '{}'", request.id);
        }
        if self.status == AuthorizationStatus::Denied {
            bail!("notifications are not authorized");
        }
        self.pending.insert(request.id.clone(), request);
        Ok(())
    }

    fn cancel(&mut self, id: &str) -> Result<()> {
        self.calls.push(Call::Cancel(id.to_string()));
        self.pending.remove(id);
        Ok(())
    }

    fn cancel_all(&mut self) -> Result<()> {
        self.calls.push(Call::CancelAll);
        self.pending.clear();
        Ok(())
    }

    fn pending(&self) -> Result<Vec<NotificationRequest>> {
        Ok(self.pending.values().cloned().collect())
    }
}
