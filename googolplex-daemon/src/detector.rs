use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

use crate::loader::{PluginLoader, is_responder_file};

/// Minimum time between two scans of the plugin directory.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct ChangeState {
    last_check: Option<Instant>,
    /// `None` until the first successful scan.
    known_mtimes: Option<HashMap<String, SystemTime>>,
}

/// Rate-limited poller over the modification times of responder files.
#[derive(Debug)]
pub struct ChangeDetector {
    dir: PathBuf,
    extension: String,
    interval: Duration,
    state: Mutex<ChangeState>,
}

impl ChangeDetector {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            interval,
            state: Mutex::new(ChangeState::default()),
        }
    }

    /// Watches the same directory and file filter as `loader`.
    pub fn for_loader(loader: &PluginLoader, interval: Duration) -> Self {
        Self::new(loader.dir(), loader.extension(), interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reports whether responder files were added, removed or touched since
    /// the previous scan. Returns `false` without scanning when called again
    /// within the interval, and on the very first scan.
    pub fn has_changed(&self) -> bool {
        self.has_changed_at(Instant::now())
    }

    pub(crate) fn has_changed_at(&self, now: Instant) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(last) = state.last_check {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        state.last_check = Some(now);

        let current = match self.scan() {
            Ok(current) => current,
            Err(err) => {
                debug!(dir = ?self.dir, %err, "cannot scan plugin directory");
                return false;
            }
        };

        let count = current.len();
        match state.known_mtimes.replace(current) {
            None => {
                debug!(count, "recorded responder baseline");
                false
            }
            Some(previous) => {
                let changed = state.known_mtimes.as_ref() != Some(&previous);
                if changed {
                    info!(before = previous.len(), after = count, "responder files changed");
                }
                changed
            }
        }
    }

    fn scan(&self) -> io::Result<HashMap<String, SystemTime>> {
        let mut mtimes = HashMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(%err, "skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if !is_responder_file(&path, &self.extension) {
                continue;
            }
            match fs::metadata(&path).and_then(|meta| meta.modified()) {
                Ok(mtime) => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    debug!(%name, ?mtime, "found responder file");
                    mtimes.insert(name, mtime);
                }
                Err(err) => warn!(?path, %err, "cannot read responder mtime"),
            }
        }
        Ok(mtimes)
    }
}
