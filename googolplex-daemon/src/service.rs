use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};
use zbus::interface;
use zbus::zvariant::Type;

use crate::answer::Answer;
use crate::descriptor::panic_message;
use crate::dispatch::Dispatcher;
use crate::query::normalize_raw_query;
use crate::search::SearchClient;

pub const BUS_NAME: &str = "org.googolplex.Engine";
pub const OBJECT_PATH: &str = "/org/googolplex/Engine1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct ResponderInfo {
    pub identity: String,
    pub name: String,
    pub badge_text: String,
    pub badge_color: String,
}

/// Front door of the daemon: dispatches a query and falls back to web search.
#[derive(Debug, Clone)]
pub struct Engine {
    dispatcher: Arc<Dispatcher>,
    search: Arc<SearchClient>,
}

impl Engine {
    pub fn new(dispatcher: Arc<Dispatcher>, search: Arc<SearchClient>) -> Self {
        Self { dispatcher, search }
    }

    /// Answers `raw` with the best responder, or with web results when no
    /// responder claims it.
    pub async fn answer(&self, raw: &str) -> Answer {
        let query = normalize_raw_query(raw);
        if query.is_empty() {
            return Answer::empty();
        }

        // Scoring may reload libraries and rendering may block on I/O.
        let dispatcher = Arc::clone(&self.dispatcher);
        let owned = query.clone();
        let rendered = tokio::task::spawn_blocking(move || {
            let descriptor = dispatcher.select(&owned)?;
            info!(identity = descriptor.identity(), "responder selected");
            let result = panic::catch_unwind(AssertUnwindSafe(|| descriptor.render(&owned)))
                .map_err(|payload| panic_message(&*payload));
            Some((descriptor.describe(), result))
        })
        .await;

        match rendered {
            Ok(Some((metadata, Ok(result)))) => Answer::from_responder(&query, &metadata, result),
            Ok(Some((metadata, Err(message)))) => {
                error!(responder = %metadata.name, %message, "responder failed while rendering");
                Answer::responder_failure(&query, &metadata.name, &message)
            }
            Ok(None) => self.web_answer(&query).await,
            Err(err) => {
                error!(%err, "dispatch task failed");
                Answer::responder_failure(&query, "Responder", &err.to_string())
            }
        }
    }

    /// Skips dispatch and asks the search backend directly.
    pub async fn web_answer(&self, raw: &str) -> Answer {
        let query = normalize_raw_query(raw);
        if query.is_empty() {
            return Answer::empty();
        }
        Answer::from_search(self.search.search(&query).await)
    }

    pub fn responder_infos(&self) -> Vec<ResponderInfo> {
        self.dispatcher
            .registry()
            .summaries()
            .into_iter()
            .map(|summary| ResponderInfo {
                identity: summary.identity,
                name: summary.metadata.name,
                badge_text: summary.metadata.badge_text,
                badge_color: summary.metadata.badge_color,
            })
            .collect()
    }

    /// Forces a reload and returns how many responders are active afterwards.
    pub async fn force_reload(&self) -> usize {
        let registry = Arc::clone(self.dispatcher.registry());
        let reloaded = tokio::task::spawn_blocking(move || {
            if let Err(err) = registry.reload() {
                error!(%err, "manual reload failed, keeping previous responders");
            }
            registry.len()
        })
        .await;
        reloaded.unwrap_or_else(|err| {
            error!(%err, "reload task failed");
            self.dispatcher.registry().len()
        })
    }
}

#[interface(name = "org.googolplex.Engine1")]
impl Engine {
    async fn ask(&self, query: &str) -> Answer {
        self.answer(query).await
    }

    async fn web_search(&self, query: &str) -> Answer {
        self.web_answer(query).await
    }

    async fn responders(&self) -> Vec<ResponderInfo> {
        self.responder_infos()
    }

    async fn reload(&self) -> u32 {
        u32::try_from(self.force_reload().await).unwrap_or(u32::MAX)
    }
}
