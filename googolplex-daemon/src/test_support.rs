//! Responders driven by small text files, so most tests can exercise discovery
//! and reloads without shared libraries, plus helpers for the few tests that
//! load the workspace's real responder libraries.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use googolplex_plugin::{Metadata, Responder, ResponderResult, Score};

use crate::descriptor::PluginDescriptor;
use crate::loader::{LoadError, UnitLoader};

/// Builds responders from `key=value` lines. The special contents `fail`,
/// `missing` and `panic` simulate a unit that errors, lacks the entry point,
/// or panics while loading.
#[derive(Default)]
pub(crate) struct TableLoader {
    loads: AtomicUsize,
}

impl TableLoader {
    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl UnitLoader for TableLoader {
    fn load_unit(&self, path: &Path) -> Result<Option<Box<dyn Responder>>, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let recipe = fs::read_to_string(path).map_err(|err| LoadError::Invalid {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        match recipe.trim() {
            "fail" => Err(LoadError::Invalid {
                path: path.to_path_buf(),
                reason: "syntax error".to_string(),
            }),
            "missing" => Ok(None),
            "panic" => panic!("unit blew up while loading"),
            recipe => Ok(Some(Box::new(FakeResponder::parse(recipe)))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Value(f64),
    Claim(bool),
    Invalid,
    Panic,
}

pub(crate) struct FakeResponder {
    name: String,
    keyword: Option<String>,
    behavior: Behavior,
    render_panics: bool,
}

impl FakeResponder {
    pub(crate) fn parse(recipe: &str) -> Self {
        let mut responder = Self {
            name: "fake".to_string(),
            keyword: None,
            behavior: Behavior::Value(0.0),
            render_panics: false,
        };
        for line in recipe.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "name" => responder.name = value.to_string(),
                "keyword" => responder.keyword = Some(value.to_string()),
                "render" => responder.render_panics = value == "panic",
                "score" => {
                    responder.behavior = match value {
                        "true" => Behavior::Claim(true),
                        "false" => Behavior::Claim(false),
                        "invalid" => Behavior::Invalid,
                        "panic" => Behavior::Panic,
                        number => number.parse().map_or(Behavior::Invalid, Behavior::Value),
                    }
                }
                _ => {}
            }
        }
        responder
    }
}

impl Responder for FakeResponder {
    fn describe(&self) -> Metadata {
        Metadata::new(&self.name, self.name.to_uppercase(), "blue")
    }

    fn score(&self, query: &str) -> Score {
        if let Some(keyword) = &self.keyword {
            if !query.contains(keyword.as_str()) {
                return Score::Confidence(0.0);
            }
        }
        match self.behavior {
            Behavior::Value(value) => Score::Confidence(value),
            Behavior::Claim(claim) => Score::Claim(claim),
            Behavior::Invalid => Score::Invalid,
            Behavior::Panic => panic!("{} cannot score", self.name),
        }
    }

    fn render(&self, query: &str) -> ResponderResult {
        if self.render_panics {
            panic!("{} cannot render", self.name);
        }
        ResponderResult::new(format!("{}: {query}", self.name), "<p>answered</p>")
            .with_badge(self.name.to_uppercase())
            .with_item("query", query)
    }
}

pub(crate) fn descriptor(identity: &str, recipe: &str) -> Arc<PluginDescriptor> {
    Arc::new(PluginDescriptor::new(
        identity,
        format!("{identity}.unit"),
        Box::new(FakeResponder::parse(recipe)),
    ))
}

pub(crate) fn write_unit(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// Pins a file's mtime so change detection does not depend on clock resolution.
pub(crate) fn set_mtime(path: &Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

/// Copies a workspace responder library, as built for this test run, into
/// `dir` under `<stem>.<dll extension>`.
pub(crate) fn install_library(dir: &Path, crate_name: &str, stem: &str) -> PathBuf {
    let file = format!(
        "{}{crate_name}.{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_EXTENSION
    );
    let exe = std::env::current_exe().unwrap();
    let built = exe
        .ancestors()
        .skip(1)
        .take(2)
        .map(|candidate| candidate.join(&file))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| panic!("{file} was not built next to {exe:?}"));

    let target = dir.join(format!("{stem}.{}", std::env::consts::DLL_EXTENSION));
    fs::copy(built, &target).unwrap();
    target
}

pub(crate) fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
