use std::path::Path;

use crate::naming::ExtensionKey;
use crate::runtime::{BackendError, BackendProvider, LoaderBackend};
use crate::runtimes::script::{ScriptBackend, ScriptLanguage};
use crate::scope::SymbolKind;

static RUBY: ScriptLanguage = ScriptLanguage {
    name: "ruby",
    extensions: &["rb"],
    declarations: &[
        (r"^def\s+(?:self\.)?([A-Za-z_]\w*[?!=]?)", SymbolKind::Function),
        (r"^class\s+([A-Z]\w*)", SymbolKind::Class),
        (r"^module\s+([A-Z]\w*)", SymbolKind::Module),
        (r"^([A-Z][A-Z0-9_]*)\s*=(?:[^=~]|$)", SymbolKind::Value),
    ],
};

pub struct RubyProvider;

impl RubyProvider {
    pub fn new() -> Self {
        Self {}
    }
}

impl BackendProvider for RubyProvider {
    fn name(&self) -> &'static str {
        "ruby"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        RUBY.extensions
    }

    fn instantiate(
        &self,
        _extension: &ExtensionKey,
        library_path: Option<&Path>,
    ) -> Result<Box<dyn LoaderBackend>, BackendError> {
        Ok(Box::new(ScriptBackend::new(&RUBY, library_path)?))
    }
}
