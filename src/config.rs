use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::factory::BackendFactory;
use crate::loader::{Lifecycle, Loader};
use crate::registry::{
    Environment, Layered, ProcessEnvironment, Registry, LOADER_LIBRARY_PATH, LOADER_SCRIPT_PATH,
};
use crate::runtimes;

/// The configuration file for Rusty Loader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Overrides the lifecycle mode the binary was built with
    pub lifecycle: Option<Lifecycle>,

    /// Log verbosity level, used when `RUST_LOG` is not set
    pub log_level: Option<String>,

    /// Fallback for `LOADER_LIBRARY_PATH`
    pub library_path: Option<PathBuf>,

    /// Fallback for `LOADER_SCRIPT_PATH`
    pub script_path: Option<PathBuf>,

    /// Extra file extensions per language, e.g. `python = ["pyi"]`
    pub extensions: BTreeMap<String, Vec<String>>,
}

impl LoaderConfig {
    /// Load configuration from a file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let config_str = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: LoaderConfig = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let config_str = toml::to_string(self).context("Failed to serialize config to TOML")?;

        fs::write(config_path, config_str)
            .with_context(|| format!("Failed to write config to file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the default config path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("rusty-loader").join("config.toml")
        } else {
            PathBuf::from("./config.toml")
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.unwrap_or_default()
    }

    /// Search-path values from the file, keyed like the environment
    pub fn path_variables(&self) -> HashMap<String, OsString> {
        let mut vars = HashMap::new();
        if let Some(path) = &self.library_path {
            vars.insert(LOADER_LIBRARY_PATH.to_string(), path.clone().into_os_string());
        }
        if let Some(path) = &self.script_path {
            vars.insert(LOADER_SCRIPT_PATH.to_string(), path.clone().into_os_string());
        }
        vars
    }

    /// Process environment first, then this file
    pub fn environment(&self) -> Box<dyn Environment> {
        Box::new(Layered {
            primary: ProcessEnvironment,
            fallback: self.path_variables(),
        })
    }

    /// Registers the configured extra extensions with `factory`
    pub fn apply_extensions(&self, factory: &mut BackendFactory) {
        for (language, extensions) in &self.extensions {
            for extension in extensions {
                if factory.alias(language, extension.as_str()) {
                    debug!("Extension .{} routed to {}", extension, language);
                } else {
                    warn!("Ignoring extension .{}: unknown language {}", extension, language);
                }
            }
        }
    }

    /// Builds a loader with the built-in languages and this configuration
    pub fn build_loader(&self) -> Loader {
        let mut factory = runtimes::init_factory();
        self.apply_extensions(&mut factory);

        let registry = Registry::with_environment(factory, self.environment());
        Loader::with_lifecycle(registry, self.lifecycle())
    }
}

/// Load the config at `path`, or the default location when `None`
pub fn load_config(path: Option<&Path>) -> Result<LoaderConfig> {
    match path {
        Some(path) => {
            let config_str = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&config_str)
                .with_context(|| format!("Failed to parse config file: {:?}", path))
        }
        None => LoaderConfig::load(&LoaderConfig::default_path()),
    }
}

/// Write a default config to `path`, or the default location when `None`.
///
/// An existing file is kept unless `force` is set.
pub fn init_config(path: Option<&Path>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(LoaderConfig::default_path);

    if config_path.exists() && !force {
        anyhow::bail!("Config file already exists: {:?}", config_path);
    }

    LoaderConfig::default().save(&config_path)?;
    info!("Created default configuration at {:?}", config_path);

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::ExtensionKey;

    #[test]
    fn test_parse_config() {
        let config: LoaderConfig = toml::from_str(
            r#"
            lifecycle = "lazy"
            log_level = "debug"
            script_path = "/srv/scripts/"

            [extensions]
            python = ["pyi"]
            "#,
        )
        .unwrap();

        assert_eq!(config.lifecycle(), Lifecycle::Lazy);
        assert_eq!(config.script_path, Some(PathBuf::from("/srv/scripts/")));
        assert_eq!(config.library_path, None);
        assert_eq!(config.extensions["python"], vec!["pyi".to_string()]);
        assert_eq!(
            config.path_variables().get(LOADER_SCRIPT_PATH),
            Some(&OsString::from("/srv/scripts/"))
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = LoaderConfig::default();
        config.lifecycle = Some(Lifecycle::Explicit);
        config.extensions.insert("ruby".to_string(), vec!["rake".to_string()]);
        config.save(&path).unwrap();

        assert_eq!(LoaderConfig::load(&path).unwrap(), config);
        assert_eq!(load_config(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = LoaderConfig::load(Path::new("/no/such/rusty-loader.toml")).unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert!(load_config(Some(Path::new("/no/such/rusty-loader.toml"))).is_err());
    }

    #[test]
    fn test_build_loader_applies_extensions() {
        let mut config = LoaderConfig::default();
        config.lifecycle = Some(Lifecycle::Lazy);
        config.extensions.insert("ruby".to_string(), vec!["rake".to_string()]);

        let mut loader = config.build_loader();
        loader
            .load_from_memory(&ExtensionKey::new("rake"), b"def build\nend\n")
            .unwrap();

        let symbol = loader.get("build").unwrap();
        assert_eq!(symbol.extension.as_str(), "rb");
    }

    #[test]
    fn test_init_config_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rusty-loader").join("config.toml");

        let written = init_config(Some(&path), false).unwrap();
        assert_eq!(written, path);
        assert_eq!(LoaderConfig::load(&path).unwrap(), LoaderConfig::default());
    }

    #[test]
    fn test_init_config_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "lifecycle = \"lazy\"\n").unwrap();

        assert!(init_config(Some(&path), false).is_err());
        assert_eq!(LoaderConfig::load(&path).unwrap().lifecycle(), Lifecycle::Lazy);

        init_config(Some(&path), true).unwrap();
        assert_eq!(LoaderConfig::load(&path).unwrap(), LoaderConfig::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_path_variables_keep_raw_bytes() {
        use std::os::unix::ffi::OsStringExt;

        let raw = OsString::from_vec(b"/scr\xffipts/".to_vec());
        let mut config = LoaderConfig::default();
        config.script_path = Some(PathBuf::from(raw.clone()));

        assert_eq!(config.path_variables().get(LOADER_SCRIPT_PATH), Some(&raw));
    }
}
