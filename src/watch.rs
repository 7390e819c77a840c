use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Watch the notification spool and return a receiver that ticks whenever it changes.
/// The watcher must be kept alive for events to be received.
///
/// The spool is replaced by rename, so the parent directory is watched and
/// events are filtered down to the spool's own file name.
pub fn watch_spool(spool_path: &Path) -> Result<(RecommendedWatcher, Receiver<()>)> {
    let (tx, rx) = mpsc::channel();

    let spool_filename = spool_path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let Ok(event) = res else {
            return;
        };
        // Reads by the delivery loop itself would wake it again
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        let ours = event.paths.iter().any(|p| {
            p.file_name()
                .map(|f| f.to_string_lossy() == spool_filename.as_str())
                .unwrap_or(false)
        });
        if ours {
            let _ = tx.send(());
        }
    })
    .context("failed to create file watcher")?;

    let watch_path = spool_path.parent().unwrap_or(spool_path);
    watcher
        .watch(watch_path, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", watch_path.display()))?;

    Ok((watcher, rx))
}

/// Waits for a spool change with timeout.
/// Returns true if an event was received, false on timeout.
pub fn wait_for_change(rx: &Receiver<()>, timeout: Duration) -> bool {
    rx.recv_timeout(timeout).is_ok()
}

/// Wait for a spool change when there is a watcher, otherwise just sleep.
/// Returns true if an event was received.
pub fn wait_or_sleep(rx: Option<&Receiver<()>>, timeout: Duration) -> bool {
    match rx {
        Some(rx) => wait_for_change(rx, timeout),
        None => {
            std::thread::sleep(timeout);
            false
        }
    }
}

/// Drains any pending events from the receiver.
pub fn drain_events(rx: &Receiver<()>) {
    while rx.try_recv().is_ok() {}
}
