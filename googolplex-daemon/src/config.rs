use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::search::SearchSettings;

/// Runtime configuration for the daemon. Every flag can also come from the
/// environment or a `.env` file.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "Routes queries to responder plugins", long_about = None)]
pub struct Config {
    /// Directory scanned for responder libraries
    #[arg(long, env = "GOOGOLPLEX_PLUGIN_DIR")]
    pub plugin_dir: Option<PathBuf>,

    /// Base URL of the fallback search backend
    #[arg(long, env = "GOOGOLPLEX_SEARCH_URL", default_value = "http://127.0.0.1:8888")]
    pub search_url: String,

    #[arg(long, env = "GOOGOLPLEX_SAFESEARCH", default_value = "1")]
    pub safesearch: String,

    #[arg(long, env = "GOOGOLPLEX_CATEGORIES", default_value = "general")]
    pub categories: String,

    /// Minimum milliseconds between two scans of the plugin directory
    #[arg(long, default_value_t = 2000)]
    pub check_interval_ms: u64,

    /// Per-request timeout for the search backend
    #[arg(long, default_value_t = 10)]
    pub search_timeout_secs: u64,

    /// Log filter, e.g. `info` or `googolplex_daemon=debug`
    #[arg(long, env = "GOOGOLPLEX_LOG", default_value = "info")]
    pub log: String,
}

impl Config {
    pub fn plugin_dir(&self) -> PathBuf {
        self.plugin_dir.clone().unwrap_or_else(default_plugin_dir)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            base_url: self.search_url.clone(),
            safesearch: self.safesearch.clone(),
            categories: self.categories.clone(),
            timeout: Duration::from_secs(self.search_timeout_secs),
        }
    }
}

/// Debug builds read responders straight from the cargo target directory,
/// release builds from the user's install location.
pub fn default_plugin_dir() -> PathBuf {
    if cfg!(debug_assertions) {
        PathBuf::from("./target/debug/")
    } else {
        dirs::home_dir()
            .map(|home| home.join(".local/lib/googolplex/plugins/"))
            .unwrap_or_else(|| PathBuf::from("plugins"))
    }
}
