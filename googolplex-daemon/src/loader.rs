use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use googolplex_plugin::{INIT_SYMBOL, Metadata, Responder, ResponderInit, ResponderResult, Score};
use libloading::{Library, Symbol};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::descriptor::{PluginDescriptor, panic_message};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read plugin directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to stage library {path:?}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to open library {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("invalid responder unit {path:?}: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("responder scan panicked: {0}")]
    Panicked(String),
}

/// Turns one file into a responder.
///
/// `Ok(None)` means the file loaded fine but is not a responder.
pub trait UnitLoader: Send + Sync {
    fn load_unit(&self, path: &Path) -> Result<Option<Box<dyn Responder>>, LoadError>;
}

/// Loads responders from shared libraries exporting [`INIT_SYMBOL`].
///
/// The dynamic linker hands back an already mapped image when it sees a path
/// (or inode) twice, so every load maps a private copy of the unit instead of
/// the unit itself. The copy lives as long as the responder.
#[derive(Debug, Clone, Copy)]
pub struct DylibLoader {
    entry_point: &'static [u8],
}

impl Default for DylibLoader {
    fn default() -> Self {
        Self {
            entry_point: INIT_SYMBOL,
        }
    }
}

impl DylibLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `symbol` instead of [`INIT_SYMBOL`].
    pub fn with_entry_point(mut self, symbol: &'static [u8]) -> Self {
        self.entry_point = symbol;
        self
    }
}

impl UnitLoader for DylibLoader {
    fn load_unit(&self, path: &Path) -> Result<Option<Box<dyn Responder>>, LoadError> {
        let shadow = shadow_copy(path)?;
        let library = unsafe { Library::new(shadow.path()) }.map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let raw = {
            let constructor: Symbol<ResponderInit> = match unsafe { library.get(self.entry_point) } {
                Ok(symbol) => symbol,
                Err(err) => {
                    debug!(?path, %err, "library has no responder entry point");
                    return Ok(None);
                }
            };
            unsafe { constructor() }
        };
        if raw.is_null() {
            return Err(LoadError::Invalid {
                path: path.to_path_buf(),
                reason: "constructor returned null".to_string(),
            });
        }

        let responder = unsafe { Box::from_raw(raw) };
        Ok(Some(Box::new(LibraryResponder {
            responder,
            _library: library,
            _shadow: shadow,
        })))
    }
}

/// Copies `path` to a hidden `.<stem>-XXXXXX.loaded` file. The copy goes next
/// to the unit when the directory is writable, since temp directories are
/// often mounted noexec. The name never matches the unit filter.
fn shadow_copy(path: &Path) -> Result<NamedTempFile, LoadError> {
    let stage = |source: io::Error| LoadError::Stage {
        path: path.to_path_buf(),
        source,
    };
    let stem = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("unit");
    let prefix = format!(".{stem}-");
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".loaded");

    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut shadow = builder
        .tempfile_in(dir)
        .or_else(|err| {
            debug!(?dir, %err, "plugin directory not writable, staging in temp dir");
            builder.tempfile()
        })
        .map_err(stage)?;

    let mut unit = fs::File::open(path).map_err(stage)?;
    io::copy(&mut unit, shadow.as_file_mut()).map_err(stage)?;
    Ok(shadow)
}

/// Keeps the library mapped for as long as the responder built from it.
/// Fields drop in order: the responder, then its code, then the copy on disk.
struct LibraryResponder {
    responder: Box<dyn Responder>,
    _library: Library,
    _shadow: NamedTempFile,
}

impl Responder for LibraryResponder {
    fn describe(&self) -> Metadata {
        self.responder.describe()
    }

    fn score(&self, query: &str) -> Score {
        self.responder.score(query)
    }

    fn render(&self, query: &str) -> ResponderResult {
        self.responder.render(query)
    }
}

/// Scans a plugin directory and builds descriptors for every responder in it.
#[derive(Clone)]
pub struct PluginLoader {
    dir: PathBuf,
    extension: String,
    units: Arc<dyn UnitLoader>,
}

impl PluginLoader {
    /// Creates a loader for the platform's shared library extension.
    pub fn new(dir: impl Into<PathBuf>, units: Arc<dyn UnitLoader>) -> Self {
        Self {
            dir: dir.into(),
            extension: std::env::consts::DLL_EXTENSION.to_string(),
            units,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Loads every responder in the directory. A missing directory yields an
    /// empty list; a single broken unit is logged and skipped.
    pub fn load(&self) -> Result<Vec<Arc<PluginDescriptor>>, LoadError> {
        if !self.dir.is_dir() {
            debug!(dir = ?self.dir, "plugin directory not found");
            return Ok(Vec::new());
        }

        info!(dir = ?self.dir, "loading responders");
        let entries = fs::read_dir(&self.dir).map_err(|source| LoadError::ReadDir {
            path: self.dir.clone(),
            source,
        })?;

        // Stems are unique within one directory and extension, so identities are too.
        let mut descriptors: Vec<Arc<PluginDescriptor>> = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => {
                    warn!(%err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !is_responder_file(&path, &self.extension) {
                continue;
            }
            let Some(identity) = identity_for(&path) else {
                continue;
            };

            let loaded = panic::catch_unwind(AssertUnwindSafe(|| self.units.load_unit(&path)))
                .unwrap_or_else(|payload| Err(LoadError::Panicked(panic_message(&*payload))));
            match loaded {
                Ok(Some(responder)) => {
                    info!(%identity, "loaded responder");
                    descriptors.push(Arc::new(PluginDescriptor::new(identity, path, responder)));
                }
                Ok(None) => debug!(%identity, "not a responder, skipping"),
                Err(err) => warn!(%identity, %err, "failed to load responder"),
            }
        }

        Ok(descriptors)
    }
}

/// Whether `path` names a responder unit: a regular file with the given
/// extension whose name does not start with an underscore.
pub fn is_responder_file(path: &Path, extension: &str) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    !name.starts_with('_')
        && path.extension().is_some_and(|ext| ext == extension)
        && path.is_file()
}

/// Identity synthesized from the file stem: `plugin_<stem>`.
pub fn identity_for(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| format!("plugin_{stem}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TableLoader, file_names, install_library, write_unit};
    use std::fs;

    fn identities(descriptors: &[Arc<PluginDescriptor>]) -> Vec<String> {
        let mut ids: Vec<String> = descriptors.iter().map(|d| d.identity().to_string()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn missing_directory_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let loader = PluginLoader::new(dir.path().join("absent"), Arc::new(TableLoader::default()))
            .with_extension("unit");
        assert!(loader.load().unwrap().is_empty());
    }

    #[test]
    fn file_instead_of_directory_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plugins");
        fs::write(&file, "").unwrap();
        let loader = PluginLoader::new(file, Arc::new(TableLoader::default())).with_extension("unit");
        assert!(loader.load().unwrap().is_empty());
    }

    #[test]
    fn filters_by_extension_underscore_and_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "weather.unit", "score=1.0");
        write_unit(dir.path(), "_disabled.unit", "score=1.0");
        write_unit(dir.path(), "notes.txt", "score=1.0");
        fs::create_dir(dir.path().join("nested.unit")).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        write_unit(&dir.path().join("sub"), "deep.unit", "score=1.0");

        let loader = PluginLoader::new(dir.path(), Arc::new(TableLoader::default())).with_extension("unit");
        let loaded = loader.load().unwrap();
        assert_eq!(identities(&loaded), vec!["plugin_weather"]);
        assert_eq!(loaded[0].path(), dir.path().join("weather.unit"));
    }

    #[test]
    fn broken_units_do_not_stop_discovery() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "good.unit", "score=0.5");
        write_unit(dir.path(), "broken.unit", "fail");
        write_unit(dir.path(), "norender.unit", "missing");
        write_unit(dir.path(), "explodes.unit", "panic");
        write_unit(dir.path(), "other.unit", "score=0.1");

        let loader = PluginLoader::new(dir.path(), Arc::new(TableLoader::default())).with_extension("unit");
        let loaded = loader.load().unwrap();
        assert_eq!(identities(&loaded), vec!["plugin_good", "plugin_other"]);
    }

    #[test]
    fn dylib_loader_rejects_non_library_files() {
        let dir = tempfile::tempdir().unwrap();
        let ext = std::env::consts::DLL_EXTENSION;
        let path = write_unit(dir.path(), &format!("garbage.{ext}"), "not a shared object");

        let err = DylibLoader::new().load_unit(&path).err().expect("garbage must not load");
        assert!(matches!(err, LoadError::Open { .. }));

        let loader = PluginLoader::new(dir.path(), Arc::new(DylibLoader::new()));
        assert!(loader.load().unwrap().is_empty());
        assert_eq!(file_names(dir.path()), vec![format!("garbage.{ext}")]);
    }

    #[test]
    fn dylib_loader_builds_responder_from_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = install_library(dir.path(), "googolplex_plugin_setup", "setup");

        let responder = DylibLoader::new().load_unit(&path).unwrap().expect("entry point exported");
        assert_eq!(responder.describe().name, "iPhone Setup");
        assert_eq!(responder.score("configure my iphone").value(), 1.0);
        assert_eq!(responder.score("weather tomorrow").value(), 0.0);

        let loaded = PluginLoader::new(dir.path(), Arc::new(DylibLoader::new())).load().unwrap();
        assert_eq!(identities(&loaded), vec!["plugin_setup"]);
        assert_eq!(loaded[0].path(), path);
    }

    #[test]
    fn library_without_entry_point_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = install_library(dir.path(), "googolplex_plugin_setup", "setup");
        let units = DylibLoader::new().with_entry_point(b"_googolplex_absent");

        assert!(units.load_unit(&path).unwrap().is_none());
        let loader = PluginLoader::new(dir.path(), Arc::new(units));
        assert!(loader.load().unwrap().is_empty());
    }

    #[test]
    fn staged_copies_go_away_with_the_responder() {
        let dir = tempfile::tempdir().unwrap();
        let ext = std::env::consts::DLL_EXTENSION;
        let path = install_library(dir.path(), "googolplex_plugin_setup", "setup");

        let responder = DylibLoader::new().load_unit(&path).unwrap().expect("entry point exported");
        let staged: Vec<String> = file_names(dir.path())
            .into_iter()
            .filter(|name| name.starts_with(".setup-") && name.ends_with(".loaded"))
            .collect();
        assert_eq!(staged.len(), 1);
        assert!(!is_responder_file(&dir.path().join(&staged[0]), ext));

        drop(responder);
        assert_eq!(file_names(dir.path()), vec![format!("setup.{ext}")]);
    }

    #[test]
    fn every_unit_gets_its_own_identity() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "weather.unit", "name=first\nscore=0.5");
        write_unit(dir.path(), "weather.other", "name=second\nscore=0.5");
        write_unit(dir.path(), "wiki.unit", "name=third\nscore=0.5");

        let loader = PluginLoader::new(dir.path(), Arc::new(TableLoader::default())).with_extension("unit");
        let loaded = loader.load().unwrap();
        assert_eq!(identities(&loaded), vec!["plugin_weather", "plugin_wiki"]);
        let weather = loaded.iter().find(|d| d.identity() == "plugin_weather").unwrap();
        assert_eq!(weather.describe().name, "first");
    }

    #[test]
    fn identity_uses_file_stem() {
        assert_eq!(
            identity_for(Path::new("/plugins/weather.so")).as_deref(),
            Some("plugin_weather")
        );
    }
}
