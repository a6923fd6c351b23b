use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while reading or writing the backing configuration document.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to read configuration {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[source] serde_yaml_ng::Error),

    #[error("Failed to write configuration {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration at {path}: {reason}")]
    Malformed { path: String, reason: String },
}

/// Errors raised by the model and validation layer.
///
/// None of these express "field X is invalid"; that outcome is reported
/// through [`ValidationMessages`](crate::validation::ValidationMessages).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Duplicate field or row '{0}'")]
    DuplicatePath(String),

    #[error("Field not found: {0}")]
    PathNotFound(String),

    #[error("Invalid validator configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
