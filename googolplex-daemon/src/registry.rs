use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use googolplex_plugin::Metadata;
use serde::Serialize;
use tracing::{error, info};

use crate::descriptor::{PluginDescriptor, panic_message};
use crate::detector::ChangeDetector;
use crate::loader::{LoadError, PluginLoader, UnitLoader};

/// An immutable view of the loaded responders. Reloads publish a new
/// snapshot instead of touching this one.
#[derive(Debug, Default)]
pub struct Snapshot {
    generation: u64,
    descriptors: Vec<Arc<PluginDescriptor>>,
}

impl Snapshot {
    /// A standalone snapshot that was never published by a registry.
    pub fn from_descriptors(descriptors: Vec<Arc<PluginDescriptor>>) -> Self {
        Self {
            generation: 0,
            descriptors,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn descriptors(&self) -> &[Arc<PluginDescriptor>] {
        &self.descriptors
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PluginDescriptor>> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponderSummary {
    pub identity: String,
    pub metadata: Metadata,
}

/// Process-wide set of loaded responders, refreshed when the plugin
/// directory changes.
pub struct PluginRegistry {
    loader: PluginLoader,
    detector: ChangeDetector,
    current: Mutex<Arc<Snapshot>>,
}

impl PluginRegistry {
    /// Builds the registry and loads every responder once.
    pub fn open(loader: PluginLoader, detector: ChangeDetector) -> Self {
        let registry = Self {
            loader,
            detector,
            current: Mutex::new(Arc::new(Snapshot::default())),
        };
        match registry.reload() {
            Ok(count) => info!(count, dir = ?registry.loader.dir(), "responders loaded"),
            Err(err) => error!(%err, "initial responder load failed"),
        }
        registry
    }

    /// Shorthand for a loader and detector over the same directory.
    pub fn for_directory(
        dir: impl Into<PathBuf>,
        units: Arc<dyn UnitLoader>,
        check_interval: Duration,
    ) -> Self {
        let loader = PluginLoader::new(dir, units);
        let detector = ChangeDetector::for_loader(&loader, check_interval);
        Self::open(loader, detector)
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.lock())
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn summaries(&self) -> Vec<ResponderSummary> {
        self.snapshot()
            .iter()
            .map(|descriptor| ResponderSummary {
                identity: descriptor.identity().to_string(),
                metadata: descriptor.describe(),
            })
            .collect()
    }

    /// Reloads when the change detector reports drift. Returns whether a new
    /// snapshot was published.
    pub fn refresh_if_needed(&self) -> bool {
        if !self.detector.has_changed() {
            return false;
        }
        info!("responder changes detected, reloading");
        match self.reload() {
            Ok(count) => {
                info!(count, "reloaded responders");
                true
            }
            Err(err) => {
                error!(%err, "reload failed, keeping previous responders");
                false
            }
        }
    }

    /// Loads the directory and publishes the result. On failure the previous
    /// snapshot stays active.
    pub fn reload(&self) -> Result<usize, LoadError> {
        let descriptors = panic::catch_unwind(AssertUnwindSafe(|| self.loader.load()))
            .unwrap_or_else(|payload| Err(LoadError::Panicked(panic_message(&*payload))))?;

        let count = descriptors.len();
        let mut current = self.lock();
        let generation = current.generation + 1;
        *current = Arc::new(Snapshot {
            generation,
            descriptors,
        });
        Ok(count)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Arc<Snapshot>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        let identities: Vec<&str> = snapshot.iter().map(|d| d.identity()).collect();
        f.debug_struct("PluginRegistry")
            .field("dir", &self.loader.dir())
            .field("generation", &snapshot.generation())
            .field("responders", &identities)
            .finish()
    }
}
