// fwconfig - configuration binding and validation for firewall settings
//
// This is the library crate containing the configuration store, the typed
// models and the validation layer. The binary crate (main.rs) provides the
// command-line entry point.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod settings;
pub mod state;
pub mod validation;

// Re-export commonly used types for convenience
pub use config::{ConfigDocument, ConfigStore};
pub use error::{ConfigError, PersistenceError};
pub use models::{FieldNode, FieldPath, Model, Unbound};
pub use settings::Settings;
pub use state::{ConfigChange, SharedConfig};
pub use validation::{ValidationMessage, ValidationMessages, ValidationRunner, Validator};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
