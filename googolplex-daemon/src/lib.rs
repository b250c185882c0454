//! Query routing core: discovers responder plugins, keeps them fresh as
//! their files change, picks the best one for a query and falls back to a
//! web-search backend when none matches.

pub mod answer;
pub mod config;
pub mod descriptor;
pub mod detector;
pub mod dispatch;
pub mod loader;
pub mod logging;
pub mod query;
pub mod registry;
pub mod search;
pub mod service;

#[cfg(test)]
mod test_support;

pub use answer::{Answer, AnswerHit, AnswerItem, AnswerKind};
pub use config::Config;
pub use descriptor::PluginDescriptor;
pub use detector::{CHECK_INTERVAL, ChangeDetector};
pub use dispatch::Dispatcher;
pub use loader::{DylibLoader, LoadError, PluginLoader, UnitLoader};
pub use registry::{PluginRegistry, ResponderSummary, Snapshot};
pub use search::{SearchClient, SearchError, SearchOutcome, SearchSettings};
pub use service::{BUS_NAME, Engine, OBJECT_PATH, ResponderInfo};
