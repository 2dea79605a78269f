use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::naming::ExtensionKey;
use crate::scope::Scope;

/// Failure reported by a language backend.
///
/// The code is opaque to the loader and is handed back to callers verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (exit code {code})")]
pub struct BackendError {
    code: i32,
    message: String,
}

impl BackendError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One instantiated language backend.
///
/// The registry owns every backend exclusively; nothing else keeps a handle
/// past a single call.
pub trait LoaderBackend: Send {
    /// Canonical key for this backend. May differ from the key it was
    /// requested under.
    fn extension(&self) -> &ExtensionKey;

    /// Symbols resolved so far
    fn scope(&self) -> &Scope;

    /// Search roots for relative artifacts, in configuration order
    fn execution_paths(&self) -> &[PathBuf];

    /// Adds a search root for relative artifacts
    fn execution_path(&mut self, path: &Path) -> Result<(), BackendError>;

    fn load_from_file(&mut self, path: &Path) -> Result<(), BackendError>;

    fn load_from_memory(
        &mut self,
        extension: &ExtensionKey,
        buffer: &[u8],
    ) -> Result<(), BackendError>;

    /// Tears the backend down. Called exactly once.
    fn destroy(self: Box<Self>) -> Result<(), BackendError>;
}

/// Creates backends for the language family it supports
pub trait BackendProvider: Send + Sync {
    /// Returns the unique identifier for this language
    fn name(&self) -> &'static str;

    /// Returns the file extensions this language is loaded from
    fn supported_extensions(&self) -> &[&'static str];

    /// Checks if this provider handles the given extension
    fn supports_extension(&self, extension: &ExtensionKey) -> bool {
        self.supported_extensions()
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(extension.as_str()))
    }

    /// Instantiates a fresh, unconfigured backend.
    ///
    /// Every backend a provider creates reports the same canonical
    /// extension, whichever of its extensions was requested.
    fn instantiate(
        &self,
        extension: &ExtensionKey,
        library_path: Option<&Path>,
    ) -> Result<Box<dyn LoaderBackend>, BackendError>;
}
