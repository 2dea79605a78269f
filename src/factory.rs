use scopeguard::ScopeGuard;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::naming::ExtensionKey;
use crate::runtime::{BackendError, BackendProvider, LoaderBackend};

#[derive(Debug, Error)]
enum CreateError {
    #[error("no provider handles extension `{0}`")]
    NoProvider(ExtensionKey),

    #[error("failed to instantiate backend: {0}")]
    Instantiate(#[source] BackendError),

    #[error("failed to configure execution path {path:?}: {source}")]
    ExecutionPath {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
}

/// Builds fully configured backends from the registered providers
#[derive(Default)]
pub struct BackendFactory {
    providers: Vec<Box<dyn BackendProvider>>,
    aliases: HashMap<ExtensionKey, usize>,
}

impl BackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Box<dyn BackendProvider>) {
        self.providers.push(provider);
    }

    /// Routes an extra extension to the provider called `language`.
    ///
    /// Returns `false` when no such provider is registered.
    pub fn alias(&mut self, language: &str, extension: impl Into<ExtensionKey>) -> bool {
        match self.providers.iter().position(|provider| provider.name() == language) {
            Some(index) => {
                self.aliases.insert(extension.into().to_lowercase(), index);
                true
            }
            None => false,
        }
    }

    pub fn find_provider(&self, extension: &ExtensionKey) -> Option<&dyn BackendProvider> {
        self.providers
            .iter()
            .find(|provider| provider.supports_extension(extension))
            .or_else(|| {
                self.aliases
                    .get(&extension.to_lowercase())
                    .and_then(|index| self.providers.get(*index))
            })
            .map(|boxed| boxed.as_ref())
    }

    pub fn get_provider_by_name(&self, name: &str) -> Option<&dyn BackendProvider> {
        self.providers
            .iter()
            .find(|provider| provider.name() == name)
            .map(|boxed| boxed.as_ref())
    }

    pub fn list_supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self
            .providers
            .iter()
            .flat_map(|provider| provider.supported_extensions().iter().map(|ext| ext.to_string()))
            .collect();
        let mut aliased: Vec<String> = self.aliases.keys().map(|ext| ext.to_string()).collect();
        aliased.sort();
        extensions.extend(aliased);
        extensions
    }

    /// Creates a backend for `extension` with its execution paths configured.
    ///
    /// The current directory is always configured first, then `script_path`
    /// when present. If any step fails the half-built backend is destroyed and
    /// `None` is returned, so a later call starts from scratch.
    pub fn create(
        &self,
        extension: &ExtensionKey,
        library_path: Option<&Path>,
        script_path: Option<&Path>,
    ) -> Option<Box<dyn LoaderBackend>> {
        match self.try_create(extension, library_path, script_path) {
            Ok(backend) => Some(backend),
            Err(e) => {
                warn!("Loader ({}) creation failed: {}", extension, e);
                None
            }
        }
    }

    fn try_create(
        &self,
        extension: &ExtensionKey,
        library_path: Option<&Path>,
        script_path: Option<&Path>,
    ) -> Result<Box<dyn LoaderBackend>, CreateError> {
        let provider = self
            .find_provider(extension)
            .ok_or_else(|| CreateError::NoProvider(extension.clone()))?;

        debug!("Instantiating {} backend for extension {}", provider.name(), extension);

        let backend = provider
            .instantiate(extension, library_path)
            .map_err(CreateError::Instantiate)?;

        // Destroys the backend on every early return below
        let mut backend = scopeguard::guard(backend, |backend| {
            let canonical = backend.extension().clone();
            debug!("Rolling back loader ({}) creation", canonical);
            if let Err(e) = backend.destroy() {
                warn!("Failed to destroy loader ({}) during rollback: {}", canonical, e);
            }
        });

        let current_dir = Path::new(".");
        backend
            .execution_path(current_dir)
            .map_err(|source| CreateError::ExecutionPath {
                path: current_dir.to_path_buf(),
                source,
            })?;

        if let Some(script_path) = script_path {
            backend
                .execution_path(script_path)
                .map_err(|source| CreateError::ExecutionPath {
                    path: script_path.to_path_buf(),
                    source,
                })?;
        }

        Ok(ScopeGuard::into_inner(backend))
    }
}
