use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use googolplex_plugin::Score;
use tracing::{debug, warn};

use crate::descriptor::{PluginDescriptor, panic_message};
use crate::registry::{PluginRegistry, Snapshot};

/// Picks the responder most willing to answer a query.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Refreshes the registry if the plugin directory changed, then scores
    /// every responder against the normalized query. `None` means no
    /// responder scored above zero.
    pub fn select(&self, query: &str) -> Option<Arc<PluginDescriptor>> {
        self.registry.refresh_if_needed();
        let snapshot = self.registry.snapshot();
        let chosen = pick(&snapshot, &normalize(query));
        debug!(
            generation = snapshot.generation(),
            chosen = chosen.as_ref().map(|d| d.identity()),
            "dispatched query"
        );
        chosen
    }
}

/// Form of the query every responder scores against.
pub fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Highest strictly positive score wins; on ties the earlier descriptor stays.
pub fn pick(snapshot: &Snapshot, normalized_query: &str) -> Option<Arc<PluginDescriptor>> {
    let mut best: (f64, Option<&Arc<PluginDescriptor>>) = (0.0, None);
    for descriptor in snapshot.iter() {
        let score = isolated_score(descriptor, normalized_query);
        if score > best.0 {
            best = (score, Some(descriptor));
        }
    }
    best.1.cloned()
}

fn isolated_score(descriptor: &PluginDescriptor, normalized_query: &str) -> f64 {
    match panic::catch_unwind(AssertUnwindSafe(|| descriptor.score(normalized_query))) {
        Ok(Score::Invalid) => {
            warn!(identity = descriptor.identity(), "responder returned an invalid score");
            0.0
        }
        Ok(score) => score.value(),
        Err(payload) => {
            warn!(
                identity = descriptor.identity(),
                panic = %panic_message(&*payload),
                "responder panicked while scoring"
            );
            0.0
        }
    }
}
