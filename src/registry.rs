use indexmap::map::Entry;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::factory::BackendFactory;
use crate::loader::LoaderError;
use crate::naming::ExtensionKey;
use crate::runtime::LoaderBackend;

pub const LOADER_LIBRARY_PATH: &str = "LOADER_LIBRARY_PATH";
pub const LOADER_SCRIPT_PATH: &str = "LOADER_SCRIPT_PATH";

/// Source of the search-path variables read at initialization
pub trait Environment: Send {
    fn var(&self, key: &str) -> Option<OsString>;
}

/// Reads the real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<OsString> {
        std::env::var_os(key)
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<OsString> {
        self.get(key).map(OsString::from)
    }
}

impl Environment for HashMap<String, OsString> {
    fn var(&self, key: &str) -> Option<OsString> {
        self.get(key).cloned()
    }
}

/// Consults `primary` first and falls back to `fallback`
pub struct Layered<P, F> {
    pub primary: P,
    pub fallback: F,
}

impl<P: Environment, F: Environment> Environment for Layered<P, F> {
    fn var(&self, key: &str) -> Option<OsString> {
        self.primary.var(key).or_else(|| self.fallback.var(key))
    }
}

fn read_path(environment: &dyn Environment, key: &str) -> Option<PathBuf> {
    environment
        .var(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Owns every live backend, keyed by canonical extension.
///
/// A registry starts uninitialized. [`Registry::initialize`] creates the
/// backend map and reads the search paths; [`Registry::destroy`] returns it
/// to the uninitialized state.
pub struct Registry {
    backends: Option<IndexMap<ExtensionKey, Box<dyn LoaderBackend>>>,
    /// Provider name to the canonical key of the backend it created
    canonical: HashMap<&'static str, ExtensionKey>,
    library_path: Option<PathBuf>,
    script_path: Option<PathBuf>,
    factory: BackendFactory,
    environment: Box<dyn Environment>,
}

impl Registry {
    pub fn new(factory: BackendFactory) -> Self {
        Self::with_environment(factory, Box::new(ProcessEnvironment))
    }

    pub fn with_environment(factory: BackendFactory, environment: Box<dyn Environment>) -> Self {
        Self {
            backends: None,
            canonical: HashMap::new(),
            library_path: None,
            script_path: None,
            factory,
            environment,
        }
    }

    /// Brings up whichever parts of the registry are still missing.
    ///
    /// Search paths already set are never re-read.
    pub fn initialize(&mut self) {
        if self.backends.is_none() {
            self.backends = Some(IndexMap::new());
        }

        if self.library_path.is_none() {
            self.library_path = read_path(self.environment.as_ref(), LOADER_LIBRARY_PATH);
            debug!("Loader library path: {:?}", self.library_path);
        }

        if self.script_path.is_none() {
            self.script_path = read_path(self.environment.as_ref(), LOADER_SCRIPT_PATH);
            debug!("Loader script path: {:?}", self.script_path);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.backends.is_some()
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.library_path.as_deref()
    }

    pub fn script_path(&self) -> Option<&Path> {
        self.script_path.as_deref()
    }

    pub fn factory(&self) -> &BackendFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut BackendFactory {
        &mut self.factory
    }

    pub fn len(&self) -> usize {
        self.backends.as_ref().map_or(0, IndexMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.backends
            .as_ref()
            .is_some_and(|backends| backends.contains_key(extension))
    }

    /// Registered extensions in registration order
    pub fn extensions(&self) -> Vec<ExtensionKey> {
        self.backends
            .as_ref()
            .map(|backends| backends.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Live backends in registration order
    pub fn backends(&self) -> impl Iterator<Item = &(dyn LoaderBackend + 'static)> + '_ {
        self.backends
            .iter()
            .flat_map(|backends| backends.values())
            .map(|backend| backend.as_ref())
    }

    /// Returns the backend for `extension`, creating it on first use.
    ///
    /// Aliases and differently cased keys resolve to the live backend of the
    /// provider that handles them. Failed creations leave nothing behind, so
    /// the next call retries.
    pub fn get_or_create(
        &mut self,
        extension: &ExtensionKey,
    ) -> Option<&mut (dyn LoaderBackend + 'static)> {
        let backends = self.backends.as_mut()?;

        let provider = self.factory.find_provider(extension).map(|provider| provider.name());
        let live = provider
            .and_then(|name| self.canonical.get(name))
            .filter(|canonical| backends.contains_key(*canonical))
            .cloned();

        let key = if backends.contains_key(extension) {
            extension.clone()
        } else if let Some(canonical) = live {
            debug!("Loader ({}) resolved to ({})", extension, canonical);
            canonical
        } else {
            let backend = self.factory.create(
                extension,
                self.library_path.as_deref(),
                self.script_path.as_deref(),
            );
            debug!(
                "Created loader ({}) implementation: {}",
                extension,
                if backend.is_some() { "ok" } else { "failed" }
            );
            let backend = backend?;
            let canonical = backend.extension().clone();

            match backends.entry(canonical.clone()) {
                Entry::Occupied(_) => {
                    // requested under an alias of a live backend
                    debug!("Loader ({}) already registered as ({})", extension, canonical);
                    if let Err(e) = backend.destroy() {
                        warn!("Failed to destroy duplicate loader ({}): {}", canonical, e);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(backend);
                }
            }

            if let Some(name) = provider {
                self.canonical.insert(name, canonical.clone());
            }

            canonical
        };

        backends.get_mut(&key).map(|backend| backend.as_mut())
    }

    /// Destroys every backend and empties the map.
    ///
    /// Backend destruction failures are logged and do not fail the call.
    pub fn unload(&mut self) -> Result<(), LoaderError> {
        let Some(backends) = self.backends.as_mut() else {
            return Ok(());
        };

        self.canonical.clear();

        let mut failures = 0usize;
        for (extension, backend) in backends.drain(..) {
            debug!("Destroying loader ({})", extension);
            if let Err(e) = backend.destroy() {
                failures += 1;
                warn!("Failed to destroy loader ({}): {}", extension, e);
            }
        }

        if failures > 0 {
            warn!("{} loader(s) failed to tear down cleanly", failures);
        }

        // drain(..) empties the map, so this only fires if that stops holding
        if !backends.is_empty() {
            return Err(LoaderError::ClearFailed(backends.len()));
        }

        Ok(())
    }

    /// Returns the registry to its uninitialized state
    pub fn destroy(&mut self) {
        if let Some(backends) = self.backends.take() {
            for (extension, backend) in backends {
                if let Err(e) = backend.destroy() {
                    warn!("Failed to destroy loader ({}): {}", extension, e);
                }
            }
        }

        self.canonical.clear();
        self.library_path = None;
        self.script_path = None;
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.destroy();
    }
}
