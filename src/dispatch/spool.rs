use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{AuthorizationStatus, FireSpec, NotificationDispatcher, NotificationRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpoolEntry {
    #[serde(flatten)]
    request: NotificationRequest,
    /// Registration time, or the last delivery for recurring requests.
    armed_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SpoolFile {
    #[serde(default)]
    authorization: AuthorizationStatus,
    #[serde(default)]
    pending: BTreeMap<String, SpoolEntry>,
}

/// File-backed notification queue.
///
/// Plays the part of the OS notification center: it outlives the process
/// that scheduled the requests, and `tend deliver` drains it.
pub struct SpoolDispatcher {
    path: PathBuf,
    deny: bool,
}

impl SpoolDispatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            deny: false,
        }
    }

    /// Refuse authorization requests, as a user who turned notifications off.
    pub fn deny(mut self, deny: bool) -> Self {
        self.deny = deny;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<SpoolFile> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(SpoolFile::default()),
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SpoolFile::default()),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", self.path.display())),
        }
    }

    /// Hold an exclusive lock on the spool's sibling lock file. Every
    /// read-modify-write runs under it; dropping the file releases it.
    fn lock(&self) -> Result<File> {
        let lock_path = self.path.with_extension("lock");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("failed to open {}", lock_path.display()))?;

        loop {
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                return Ok(file);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err)
                    .with_context(|| format!("failed to lock {}", lock_path.display()));
            }
        }
    }

    /// Replace the spool through a uniquely named temp file in the same
    /// directory, so readers see either the old or the new contents.
    fn store(&self, spool: &SpoolFile) -> Result<()> {
        let json = serde_json::to_vec_pretty(spool)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&json)
            .with_context(|| format!("failed to write {}", tmp.path().display()))?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Remove and return every request due at `now`.
    ///
    /// One-shot requests are consumed. Recurring requests stay pending and are
    /// re-armed, so each fires at most once per day at their hour:minute in
    /// `now`'s time zone.
    pub fn take_due<Tz: TimeZone>(&mut self, now: DateTime<Tz>) -> Result<Vec<NotificationRequest>> {
        let _lock = self.lock()?;
        let mut spool = self.load()?;
        let tz = now.timezone();
        let now_utc = now.with_timezone(&Utc);
        let mut due = Vec::new();

        spool.pending.retain(|_, entry| match entry.request.fire {
            FireSpec::OneShot { at } => {
                if at <= now_utc {
                    due.push(entry.request.clone());
                    false
                } else {
                    true
                }
            }
            FireSpec::Recurring { hour, minute } => {
                if let Some(next) = next_daily(entry.armed_at, hour, minute, &tz) {
                    if next <= now_utc {
                        due.push(entry.request.clone());
                        entry.armed_at = now_utc;
                    }
                }
                true
            }
        });

        if !due.is_empty() {
            self.store(&spool)?;
        }
        Ok(due)
    }

    /// Earliest instant at which something in the spool becomes due.
    pub fn next_due<Tz: TimeZone>(&self, tz: &Tz) -> Result<Option<DateTime<Utc>>> {
        let spool = self.load()?;
        Ok(spool
            .pending
            .values()
            .filter_map(|entry| match entry.request.fire {
                FireSpec::OneShot { at } => Some(at),
                FireSpec::Recurring { hour, minute } => {
                    next_daily(entry.armed_at, hour, minute, tz)
                }
            })
            .min())
    }
}

/// First local `hour:minute` strictly after `after`.
fn next_daily<Tz: TimeZone>(
    after: DateTime<Utc>,
    hour: u32,
    minute: u32,
    tz: &Tz,
) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let mut date = after.with_timezone(tz).date_naive();
    // A DST gap can swallow the wall-clock time for one day
    for _ in 0..3 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(time)).earliest() {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > after {
                return Some(candidate);
            }
        }
        date = date.succ_opt()?;
    }
    None
}

impl NotificationDispatcher for SpoolDispatcher {
    fn request_authorization(&mut self) -> Result<bool> {
        let _lock = self.lock()?;
        let mut spool = self.load()?;
        spool.authorization = if self.deny {
            AuthorizationStatus::Denied
        } else {
            AuthorizationStatus::Authorized
        };
        self.store(&spool)?;
        Ok(spool.authorization == AuthorizationStatus::Authorized)
    }

    fn authorization_status(&self) -> Result<AuthorizationStatus> {
        Ok(self.load()?.authorization)
    }

    fn schedule(&mut self, request: NotificationRequest) -> Result<()> {
        let _lock = self.lock()?;
        let mut spool = self.load()?;
        if self.deny || spool.authorization == AuthorizationStatus::Denied {
            bail!("notifications are not authorized");
        }
        spool.pending.insert(
            request.id.clone(),
            SpoolEntry {
                request,
                armed_at: Utc::now(),
            },
        );
        self.store(&spool)
    }

    fn cancel(&mut self, id: &str) -> Result<()> {
        let _lock = self.lock()?;
        let mut spool = self.load()?;
        if spool.pending.remove(id).is_some() {
            self.store(&spool)?;
        }
        Ok(())
    }

    fn cancel_all(&mut self) -> Result<()> {
        let _lock = self.lock()?;
        let mut spool = self.load()?;
        spool.pending.clear();
        self.store(&spool)
    }

    fn pending(&self) -> Result<Vec<NotificationRequest>> {
        Ok(self
            .load()?
            .pending
            .into_values()
            .map(|entry| entry.request)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeDelta};

    fn spool() -> (tempfile::TempDir, SpoolDispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let d = SpoolDispatcher::new(dir.path().join("notifications.json"));
        (dir, d)
    }

    fn one_shot(id: &str, at: DateTime<Utc>) -> NotificationRequest {
        NotificationRequest {
            id: id.into(),
            fire: FireSpec::OneShot { at },
            title: "Task reminder".into(),
            body: format!("Don't forget: {id}"),
        }
    }

    fn daily(id: &str, hour: u32, minute: u32) -> NotificationRequest {
        NotificationRequest {
            id: id.into(),
            fire: FireSpec::Recurring { hour, minute },
            title: "Habit reminder".into(),
            body: format!("Time to practice: {id}"),
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let (_dir, d) = spool();
        assert!(d.pending().unwrap().is_empty());
        assert_eq!(
            d.authorization_status().unwrap(),
            AuthorizationStatus::NotDetermined
        );
    }

    #[test]
    fn schedule_persists_across_instances() {
        let (_dir, mut d) = spool();
        let at = Utc::now() + TimeDelta::hours(1);
        d.schedule(one_shot("a", at)).unwrap();

        let reopened = SpoolDispatcher::new(d.path());
        let pending = reopened.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "a");
    }

    #[test]
    fn schedule_same_id_replaces() {
        let (_dir, mut d) = spool();
        let at = Utc::now() + TimeDelta::hours(1);
        d.schedule(one_shot("a", at)).unwrap();
        d.schedule(daily("a", 8, 0)).unwrap();
        let pending = d.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fire, FireSpec::Recurring { hour: 8, minute: 0 });
    }

    #[test]
    fn cancel_and_cancel_all() {
        let (_dir, mut d) = spool();
        d.schedule(daily("a", 8, 0)).unwrap();
        d.schedule(daily("b", 9, 0)).unwrap();
        d.cancel("a").unwrap();
        d.cancel("missing").unwrap();
        assert_eq!(d.pending().unwrap().len(), 1);
        d.cancel_all().unwrap();
        assert!(d.pending().unwrap().is_empty());
    }

    #[test]
    fn denied_rejects_schedule() {
        let (_dir, d) = spool();
        let mut d = d.deny(true);
        assert!(!d.request_authorization().unwrap());
        assert_eq!(d.authorization_status().unwrap(), AuthorizationStatus::Denied);
        let err = d.schedule(daily("a", 8, 0)).unwrap_err();
        assert!(err.to_string().contains("not authorized"));
    }

    #[test]
    fn request_authorization_grants() {
        let (_dir, mut d) = spool();
        assert!(d.request_authorization().unwrap());
        assert_eq!(
            d.authorization_status().unwrap(),
            AuthorizationStatus::Authorized
        );
    }

    #[test]
    fn take_due_consumes_one_shots() {
        let (_dir, mut d) = spool();
        let now = Utc::now();
        d.schedule(one_shot("past", now - TimeDelta::minutes(1))).unwrap();
        d.schedule(one_shot("future", now + TimeDelta::hours(1))).unwrap();

        let due = d.take_due(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "past");

        let pending = d.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "future");
        assert!(d.take_due(now).unwrap().is_empty());
    }

    #[test]
    fn recurring_fires_once_per_day() {
        let (_dir, mut d) = spool();
        d.schedule(daily("h", 0, 0)).unwrap();

        // The next local midnight after registration is at most a day away.
        let tz = FixedOffset::east_opt(0).unwrap();
        let later = (Utc::now() + TimeDelta::days(1) + TimeDelta::minutes(1)).with_timezone(&tz);
        let due = d.take_due(later).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "h");

        // Still pending, but re-armed.
        assert_eq!(d.pending().unwrap().len(), 1);
        assert!(d.take_due(later).unwrap().is_empty());
    }

    #[test]
    fn next_daily_same_day_and_next_day() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        // 06:00 UTC is 08:00 local.
        let after = Utc.with_ymd_and_hms(2026, 5, 1, 6, 0, 0).unwrap();
        assert_eq!(
            next_daily(after, 9, 0, &tz),
            Some(Utc.with_ymd_and_hms(2026, 5, 1, 7, 0, 0).unwrap())
        );
        assert_eq!(
            next_daily(after, 8, 0, &tz),
            Some(Utc.with_ymd_and_hms(2026, 5, 2, 6, 0, 0).unwrap())
        );
    }

    #[test]
    fn next_due_is_earliest() {
        let (_dir, mut d) = spool();
        let soon = Utc::now() + TimeDelta::minutes(5);
        d.schedule(one_shot("soon", soon)).unwrap();
        d.schedule(one_shot("later", soon + TimeDelta::hours(2))).unwrap();
        assert_eq!(d.next_due(&Utc).unwrap(), Some(soon));
    }

    #[test]
    fn concurrent_writers_keep_the_spool_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.json");

        let deliverer = {
            let path = path.clone();
            std::thread::spawn(move || {
                let mut d = SpoolDispatcher::new(path);
                let mut delivered = 0;
                for i in 0..100 {
                    let past = Utc::now() - TimeDelta::minutes(1);
                    d.schedule(one_shot(&format!("a{i}"), past)).unwrap();
                    delivered += d.take_due(Utc::now()).unwrap().len();
                }
                delivered
            })
        };
        let scheduler = {
            let path = path.clone();
            std::thread::spawn(move || {
                let mut d = SpoolDispatcher::new(path);
                for i in 0..200 {
                    d.schedule(daily(&format!("b{i}"), 6, 0)).unwrap();
                }
            })
        };

        assert_eq!(deliverer.join().unwrap(), 100);
        scheduler.join().unwrap();

        let pending = SpoolDispatcher::new(&path).pending().unwrap();
        assert_eq!(pending.len(), 200);
        assert!(pending.iter().all(|r| r.id.starts_with('b')));
    }
}
