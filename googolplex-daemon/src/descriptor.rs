use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};

use googolplex_plugin::{Metadata, Responder, ResponderResult, Score};

/// A loaded responder together with the file it came from.
pub struct PluginDescriptor {
    identity: String,
    path: PathBuf,
    responder: Box<dyn Responder>,
}

impl PluginDescriptor {
    pub fn new(identity: impl Into<String>, path: impl Into<PathBuf>, responder: Box<dyn Responder>) -> Self {
        Self {
            identity: identity.into(),
            path: path.into(),
            responder,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn describe(&self) -> Metadata {
        self.responder.describe()
    }

    pub fn score(&self, normalized_query: &str) -> Score {
        self.responder.score(normalized_query)
    }

    pub fn render(&self, query: &str) -> ResponderResult {
        self.responder.render(query)
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("identity", &self.identity)
            .field("path", &self.path)
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
