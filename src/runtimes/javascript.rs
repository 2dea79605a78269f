use std::path::Path;

use crate::naming::ExtensionKey;
use crate::runtime::{BackendError, BackendProvider, LoaderBackend};
use crate::runtimes::script::{ScriptBackend, ScriptLanguage};
use crate::scope::SymbolKind;

static JAVASCRIPT: ScriptLanguage = ScriptLanguage {
    name: "javascript",
    extensions: &["js", "mjs", "cjs"],
    declarations: &[
        (
            r"^(?:export\s+(?:default\s+)?)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)",
            SymbolKind::Function,
        ),
        (
            r"^(?:export\s+(?:default\s+)?)?class\s+([A-Za-z_$][\w$]*)",
            SymbolKind::Class,
        ),
        (
            r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)",
            SymbolKind::Value,
        ),
    ],
};

pub struct JavaScriptProvider;

impl JavaScriptProvider {
    pub fn new() -> Self {
        Self {}
    }
}

impl BackendProvider for JavaScriptProvider {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        JAVASCRIPT.extensions
    }

    fn instantiate(
        &self,
        _extension: &ExtensionKey,
        library_path: Option<&Path>,
    ) -> Result<Box<dyn LoaderBackend>, BackendError> {
        Ok(Box::new(ScriptBackend::new(&JAVASCRIPT, library_path)?))
    }
}
