use std::path::Path;

use crate::naming::ExtensionKey;
use crate::runtime::{BackendError, BackendProvider, LoaderBackend};
use crate::runtimes::script::{ScriptBackend, ScriptLanguage};
use crate::scope::SymbolKind;

static PYTHON: ScriptLanguage = ScriptLanguage {
    name: "python",
    extensions: &["py", "pyw"],
    declarations: &[
        (r"^(?:async\s+)?def\s+([A-Za-z_]\w*)", SymbolKind::Function),
        (r"^class\s+([A-Za-z_]\w*)", SymbolKind::Class),
        // plain and annotated assignments, not comparisons
        (r"^([A-Za-z_]\w*)\s*(?::[^=]+)?=(?:[^=]|$)", SymbolKind::Value),
    ],
};

pub struct PythonProvider;

impl PythonProvider {
    pub fn new() -> Self {
        Self {}
    }
}

impl BackendProvider for PythonProvider {
    fn name(&self) -> &'static str {
        "python"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        PYTHON.extensions
    }

    fn instantiate(
        &self,
        _extension: &ExtensionKey,
        library_path: Option<&Path>,
    ) -> Result<Box<dyn LoaderBackend>, BackendError> {
        Ok(Box::new(ScriptBackend::new(&PYTHON, library_path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_declarations() {
        let mut backend = PythonProvider::new()
            .instantiate(&ExtensionKey::new("py"), None)
            .unwrap();

        let source = "\
import os

MAX_RETRIES = 3
timeout: float = 1.5

class Client:
    def send(self):
        pass

async def main():
    if MAX_RETRIES == 3:
        pass
";
        backend
            .load_from_memory(&ExtensionKey::new("py"), source.as_bytes())
            .unwrap();

        let scope = backend.scope();
        assert_eq!(scope.get("MAX_RETRIES").unwrap().kind, SymbolKind::Value);
        assert_eq!(scope.get("timeout").unwrap().kind, SymbolKind::Value);
        assert_eq!(scope.get("Client").unwrap().kind, SymbolKind::Class);
        assert_eq!(scope.get("main").unwrap().line, 10);
        assert!(scope.get("send").is_none());
        assert!(scope.get("os").is_none());
        assert_eq!(scope.len(), 4);
    }
}
