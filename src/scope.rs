use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

use crate::naming::ExtensionKey;

/// What kind of declaration a symbol came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Module,
    Value,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Module => "module",
            SymbolKind::Value => "value",
        };
        f.write_str(name)
    }
}

/// A resolved symbol exposed by one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Canonical extension of the backend that owns the symbol
    pub extension: ExtensionKey,
    /// Artifact path, or `<memory>` for buffers
    pub origin: String,
    /// 1-based line of the declaration
    pub line: usize,
}

/// Symbol table of a single backend.
///
/// Later definitions of the same name replace earlier ones, matching how a
/// script re-binding a name shadows the previous value.
#[derive(Debug, Default)]
pub struct Scope {
    symbols: IndexMap<String, Symbol>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, symbol: Symbol) -> Option<Symbol> {
        self.symbols.insert(symbol.name.clone(), symbol)
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols in definition order
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
    }
}
