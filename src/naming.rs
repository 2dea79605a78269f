use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identifies a source-language family, usually by file suffix (`py`, `js`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionKey(String);

impl ExtensionKey {
    pub fn new(extension: impl Into<String>) -> Self {
        Self(extension.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased copy, used by backends to derive their canonical key
    pub fn to_lowercase(&self) -> Self {
        Self(self.0.to_lowercase())
    }
}

impl fmt::Display for ExtensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ExtensionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExtensionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ExtensionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Extracts the extension key of an artifact path.
///
/// The key is whatever follows the last `.` of the final path component.
/// Paths without a dot, or with nothing after it (`archive.`), yield `None`.
/// Leading-dot names such as `.profile` count as having the suffix `profile`.
/// The stem may hold any bytes; only the suffix must be valid UTF-8.
pub fn extension_of(path: &Path) -> Option<ExtensionKey> {
    let file_name = path.file_name()?.as_encoded_bytes();
    let dot = file_name.iter().rposition(|&byte| byte == b'.')?;
    let suffix = &file_name[dot + 1..];

    if suffix.is_empty() {
        return None;
    }

    std::str::from_utf8(suffix).ok().map(ExtensionKey::new)
}

/// Prefixes `path` with `script_path` by raw concatenation.
///
/// No separator is inserted and no normalization happens, so `"/scripts/"`
/// and `"app.py"` give `"/scripts/app.py"` while `"/scripts"` and `"app.py"`
/// give `"/scriptsapp.py"`.
pub fn compose_path(script_path: Option<&Path>, path: &Path) -> PathBuf {
    match script_path {
        Some(prefix) => {
            let mut composed = OsString::from(prefix.as_os_str());
            composed.push(path.as_os_str());
            PathBuf::from(composed)
        }
        None => path.to_path_buf(),
    }
}
