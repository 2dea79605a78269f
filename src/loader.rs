use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

use crate::naming::{self, ExtensionKey};
use crate::registry::Registry;
use crate::runtime::BackendError;
use crate::scope::Symbol;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("loader is not initialized")]
    Uninitialized,

    #[error("cannot determine the extension of {0:?}")]
    MissingExtension(String),

    #[error("no loader available for extension `{0}`")]
    NoBackend(ExtensionKey),

    #[error("loader ({extension}) failed: {source}")]
    Load {
        extension: ExtensionKey,
        #[source]
        source: BackendError,
    },

    #[error("backend map still holds {0} entries after teardown")]
    ClearFailed(usize),
}

impl LoaderError {
    /// Numeric status for callers that speak exit codes.
    ///
    /// Backend failures keep the backend's own code.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoaderError::Load { source, .. } => source.code(),
            _ => 1,
        }
    }
}

/// Collapses an operation result into an exit code, `0` meaning success
pub fn exit_code(result: &Result<(), LoaderError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.exit_code(),
    }
}

/// Who is responsible for initializing and tearing down the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Every operation initializes on demand and `unload` destroys
    Lazy,
    /// The caller invokes `initialize` and `destroy` itself
    Explicit,
}

impl Default for Lifecycle {
    fn default() -> Self {
        if cfg!(feature = "lazy") {
            Lifecycle::Lazy
        } else {
            Lifecycle::Explicit
        }
    }
}

/// Public entry point for loading artifacts and resolving their symbols
pub struct Loader {
    registry: Registry,
    lifecycle: Lifecycle,
}

impl Loader {
    pub fn new(registry: Registry) -> Self {
        Self::with_lifecycle(registry, Lifecycle::default())
    }

    pub fn with_lifecycle(registry: Registry, lifecycle: Lifecycle) -> Self {
        Self { registry, lifecycle }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn initialize(&mut self) {
        self.registry.initialize();
    }

    fn lazy_initialize(&mut self) {
        if self.lifecycle == Lifecycle::Lazy {
            debug!("Loader lazy initialization");
            self.registry.initialize();
        }
    }

    /// Reserved for loading whole directories; currently only checks that
    /// the loader is ready.
    pub fn load_path(&mut self, path: &Path) -> Result<(), LoaderError> {
        self.lazy_initialize();

        if !self.registry.is_initialized() {
            return Err(LoaderError::Uninitialized);
        }

        debug!("Loader path {:?} accepted, nothing to do", path);
        Ok(())
    }

    /// Loads one artifact through the backend matching its extension.
    ///
    /// With a script path configured, `path` is appended to it verbatim.
    pub fn load_from_file(&mut self, path: &Path) -> Result<(), LoaderError> {
        self.lazy_initialize();

        if !self.registry.is_initialized() {
            return Err(LoaderError::Uninitialized);
        }

        let extension = naming::extension_of(path)
            .ok_or_else(|| LoaderError::MissingExtension(path.display().to_string()))?;

        let effective_path = naming::compose_path(self.registry.script_path(), path);

        let backend = self
            .registry
            .get_or_create(&extension)
            .ok_or_else(|| LoaderError::NoBackend(extension.clone()))?;

        debug!("Loader ({}) loading {:?}", backend.extension(), effective_path);

        backend
            .load_from_file(&effective_path)
            .map_err(|source| LoaderError::Load { extension, source })
    }

    pub fn load_from_memory(
        &mut self,
        extension: &ExtensionKey,
        buffer: &[u8],
    ) -> Result<(), LoaderError> {
        self.lazy_initialize();

        if !self.registry.is_initialized() {
            return Err(LoaderError::Uninitialized);
        }

        let backend = self
            .registry
            .get_or_create(extension)
            .ok_or_else(|| LoaderError::NoBackend(extension.clone()))?;

        debug!(
            "Loader ({}) loading {} bytes from memory",
            backend.extension(),
            buffer.len()
        );

        backend
            .load_from_memory(extension, buffer)
            .map_err(|source| LoaderError::Load {
                extension: extension.clone(),
                source,
            })
    }

    /// Finds `name` in the first backend, in registration order, that
    /// defines it.
    pub fn get(&mut self, name: &str) -> Option<Symbol> {
        self.lazy_initialize();

        let symbol = self
            .registry
            .backends()
            .find_map(|backend| backend.scope().get(name).cloned());

        if let Some(symbol) = &symbol {
            debug!("Loader get: ({}) resolved {}", symbol.extension, name);
        }

        symbol
    }

    /// Destroys every backend. In lazy mode the whole registry is destroyed
    /// afterwards, even if clearing failed.
    pub fn unload(&mut self) -> Result<(), LoaderError> {
        self.lazy_initialize();

        let result = self.registry.unload();

        if self.lifecycle == Lifecycle::Lazy {
            debug!("Loader lazy destruction");
            self.registry.destroy();
        }

        result
    }

    pub fn destroy(&mut self) {
        self.registry.destroy();
    }
}

lazy_static! {
    static ref LOADER_INFO: String = {
        let linkage = if cfg!(feature = "static-link") {
            "Compiled as static library type"
        } else {
            "Compiled as shared library type"
        };
        let lifecycle = match Lifecycle::default() {
            Lifecycle::Lazy => "Compiled with lazy initialization and destruction",
            Lifecycle::Explicit => "Compiled with explicit initialization and destruction",
        };
        format!(
            "Loader Library {}\n{}\n{}\n",
            env!("CARGO_PKG_VERSION"),
            linkage,
            lifecycle
        )
    };

    static ref GLOBAL_LOADER: Mutex<Option<Loader>> = Mutex::new(None);
}

/// Describes the build: version, linkage and lifecycle mode
pub fn print_info() -> &'static str {
    LOADER_INFO.as_str()
}

/// Installs the process-wide loader, returning the previous one
pub fn install_global(loader: Loader) -> Option<Loader> {
    GLOBAL_LOADER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(loader)
}

/// Removes the process-wide loader
pub fn take_global() -> Option<Loader> {
    GLOBAL_LOADER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}

/// Runs `f` against the process-wide loader, if one is installed
pub fn with_global<R>(f: impl FnOnce(&mut Loader) -> R) -> Option<R> {
    let mut guard = GLOBAL_LOADER.lock().unwrap_or_else(PoisonError::into_inner);
    guard.as_mut().map(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtimes;
    use std::collections::HashMap;

    fn loader(lifecycle: Lifecycle) -> Loader {
        let environment: HashMap<String, String> = HashMap::new();
        let registry = Registry::with_environment(runtimes::init_factory(), Box::new(environment));
        Loader::with_lifecycle(registry, lifecycle)
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Ok(())), 0);
        assert_eq!(exit_code(&Err(LoaderError::Uninitialized)), 1);
        assert_eq!(
            exit_code(&Err(LoaderError::Load {
                extension: ExtensionKey::new("py"),
                source: BackendError::new(42, "boom"),
            })),
            42
        );
    }

    #[test]
    fn test_explicit_mode_is_noop_before_initialize() {
        let mut loader = loader(Lifecycle::Explicit);

        assert!(matches!(
            loader.load_path(Path::new("scripts")),
            Err(LoaderError::Uninitialized)
        ));
        assert!(matches!(
            loader.load_from_file(Path::new("app.py")),
            Err(LoaderError::Uninitialized)
        ));
        assert!(matches!(
            loader.load_from_memory(&ExtensionKey::new("py"), b"def f(): pass\n"),
            Err(LoaderError::Uninitialized)
        ));
        assert!(loader.get("f").is_none());
        assert!(loader.unload().is_ok());
        assert!(!loader.registry().is_initialized());
    }

    #[test]
    fn test_lazy_mode_initializes_and_destroys() {
        let mut loader = loader(Lifecycle::Lazy);

        assert!(loader.load_path(Path::new("scripts")).is_ok());
        assert!(loader.registry().is_initialized());

        loader
            .load_from_memory(&ExtensionKey::new("rb"), b"def greet\nend\n")
            .unwrap();
        assert_eq!(loader.get("greet").unwrap().extension.as_str(), "rb");

        loader.unload().unwrap();
        assert!(!loader.registry().is_initialized());
    }

    #[test]
    fn test_missing_extension_creates_nothing() {
        let mut loader = loader(Lifecycle::Explicit);
        loader.initialize();

        let err = loader.load_from_file(Path::new("Makefile")).unwrap_err();
        assert!(matches!(err, LoaderError::MissingExtension(_)));
        assert_eq!(err.exit_code(), 1);
        assert!(loader.registry().is_empty());
    }

    #[test]
    fn test_unknown_extension() {
        let mut loader = loader(Lifecycle::Explicit);
        loader.initialize();

        let err = loader.load_from_file(Path::new("main.cob")).unwrap_err();
        assert!(matches!(err, LoaderError::NoBackend(_)));
        assert!(loader.registry().is_empty());
    }

    #[test]
    fn test_print_info_mentions_lifecycle() {
        let info = print_info();
        assert!(info.starts_with("Loader Library "));
        assert!(info.contains("initialization and destruction"));
    }

    #[test]
    fn test_global_loader_slot() {
        assert!(install_global(loader(Lifecycle::Lazy)).is_none());

        let loaded = with_global(|loader| {
            loader.load_from_memory(&ExtensionKey::new("js"), b"function main() {}\n")
        });
        assert!(matches!(loaded, Some(Ok(()))));

        let found = with_global(|loader| loader.get("main")).flatten();
        assert_eq!(found.unwrap().extension.as_str(), "js");

        assert!(take_global().is_some());
        assert!(with_global(|loader| loader.get("main")).is_none());
    }
}
