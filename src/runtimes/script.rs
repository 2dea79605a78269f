use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::naming::ExtensionKey;
use crate::runtime::{BackendError, LoaderBackend};
use crate::scope::{Scope, Symbol, SymbolKind};

/// Artifact could not be found or read
pub const EXIT_NOT_FOUND: i32 = 1;
/// Artifact is not valid UTF-8
pub const EXIT_BAD_ENCODING: i32 = 2;

const MEMORY_ORIGIN: &str = "<memory>";

/// Static description of a scripting language
pub struct ScriptLanguage {
    pub name: &'static str,
    /// The first entry is the canonical extension
    pub extensions: &'static [&'static str],
    /// Line patterns whose first capture group is a top-level name
    pub declarations: &'static [(&'static str, SymbolKind)],
}

/// Backend that discovers the top-level declarations of scripts
pub struct ScriptBackend {
    language: &'static ScriptLanguage,
    extension: ExtensionKey,
    library_path: Option<PathBuf>,
    execution_paths: Vec<PathBuf>,
    declarations: Vec<(Regex, SymbolKind)>,
    scope: Scope,
    loaded: Vec<PathBuf>,
}

impl ScriptBackend {
    pub fn new(
        language: &'static ScriptLanguage,
        library_path: Option<&Path>,
    ) -> Result<Self, BackendError> {
        if let Some(library_path) = library_path {
            if !library_path.is_dir() {
                return Err(BackendError::new(
                    EXIT_NOT_FOUND,
                    format!("library path {:?} is not a directory", library_path),
                ));
            }
        }

        let mut declarations = Vec::with_capacity(language.declarations.len());
        for (pattern, kind) in language.declarations {
            match Regex::new(pattern) {
                Ok(regex) => declarations.push((regex, *kind)),
                Err(e) => warn!("Invalid {} declaration pattern {}: {}", language.name, pattern, e),
            }
        }

        let canonical = language.extensions.first().copied().unwrap_or(language.name);

        Ok(Self {
            language,
            extension: ExtensionKey::new(canonical),
            library_path: library_path.map(Path::to_path_buf),
            execution_paths: Vec::new(),
            declarations,
            scope: Scope::new(),
            loaded: Vec::new(),
        })
    }

    pub fn language(&self) -> &'static str {
        self.language.name
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.library_path.as_deref()
    }

    /// Artifacts loaded from disk, in load order
    pub fn loaded(&self) -> &[PathBuf] {
        &self.loaded
    }

    fn resolve(&self, path: &Path) -> Option<PathBuf> {
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }

        self.execution_paths
            .iter()
            .map(|root| root.join(path))
            .find(|candidate| candidate.is_file())
    }

    fn scan(&mut self, source: &str, origin: &str) -> usize {
        let mut found = 0;

        for (index, line) in source.lines().enumerate() {
            for (regex, kind) in &self.declarations {
                let Some(name) = regex.captures(line).and_then(|caps| caps.get(1)) else {
                    continue;
                };

                self.scope.define(Symbol {
                    name: name.as_str().to_string(),
                    kind: *kind,
                    extension: self.extension.clone(),
                    origin: origin.to_string(),
                    line: index + 1,
                });
                found += 1;
                break;
            }
        }

        found
    }
}

impl LoaderBackend for ScriptBackend {
    fn extension(&self) -> &ExtensionKey {
        &self.extension
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn execution_paths(&self) -> &[PathBuf] {
        &self.execution_paths
    }

    fn execution_path(&mut self, path: &Path) -> Result<(), BackendError> {
        if !path.is_dir() {
            return Err(BackendError::new(
                EXIT_NOT_FOUND,
                format!("execution path {:?} is not a directory", path),
            ));
        }

        debug!("Loader ({}) execution path: {:?}", self.extension, path);
        self.execution_paths.push(path.to_path_buf());
        Ok(())
    }

    fn load_from_file(&mut self, path: &Path) -> Result<(), BackendError> {
        let resolved = self.resolve(path).ok_or_else(|| {
            BackendError::new(EXIT_NOT_FOUND, format!("script {:?} not found", path))
        })?;

        let bytes = std::fs::read(&resolved).map_err(|e| {
            BackendError::new(EXIT_NOT_FOUND, format!("failed to read {:?}: {}", resolved, e))
        })?;

        let source = String::from_utf8(bytes).map_err(|e| {
            BackendError::new(
                EXIT_BAD_ENCODING,
                format!("{:?} is not valid UTF-8: {}", resolved, e),
            )
        })?;

        let origin = resolved.display().to_string();
        let found = self.scan(&source, &origin);
        info!(
            "{} loader: {} declarations from {:?}",
            self.language.name, found, resolved
        );

        self.loaded.push(resolved);
        Ok(())
    }

    fn load_from_memory(
        &mut self,
        extension: &ExtensionKey,
        buffer: &[u8],
    ) -> Result<(), BackendError> {
        let source = std::str::from_utf8(buffer).map_err(|e| {
            BackendError::new(
                EXIT_BAD_ENCODING,
                format!("buffer for `{}` is not valid UTF-8: {}", extension, e),
            )
        })?;

        let found = self.scan(source, MEMORY_ORIGIN);
        info!("{} loader: {} declarations from memory", self.language.name, found);
        Ok(())
    }

    fn destroy(mut self: Box<Self>) -> Result<(), BackendError> {
        debug!(
            "Destroying {} loader ({} symbols, {} artifacts)",
            self.language.name,
            self.scope.len(),
            self.loaded.len()
        );
        self.scope.clear();
        self.loaded.clear();
        Ok(())
    }
}
