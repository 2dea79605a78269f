//! Loads scripts written in several languages into one process and resolves
//! their top-level symbols through a single lookup.
//!
//! A [`Loader`] picks the backend for each artifact by file extension,
//! creating it on first use, and [`Loader::get`] searches every live backend.

pub mod config;
pub mod factory;
pub mod loader;
pub mod naming;
pub mod registry;
pub mod runtime;
pub mod runtimes;
pub mod scope;

pub use config::LoaderConfig;
pub use factory::BackendFactory;
pub use loader::{exit_code, print_info, Lifecycle, Loader, LoaderError};
pub use naming::ExtensionKey;
pub use registry::Registry;
pub use runtime::{BackendError, BackendProvider, LoaderBackend};
pub use scope::{Scope, Symbol, SymbolKind};
