mod python;
mod javascript;
mod ruby;
pub mod script;

pub use python::PythonProvider;
pub use javascript::JavaScriptProvider;
pub use ruby::RubyProvider;

use crate::factory::BackendFactory;

/// Initialize a backend factory with all built-in languages
pub fn init_factory() -> BackendFactory {
    let mut factory = BackendFactory::new();

    factory.register(Box::new(PythonProvider::new()));
    factory.register(Box::new(JavaScriptProvider::new()));
    factory.register(Box::new(RubyProvider::new()));

    factory
}
