pub mod document;

pub use document::ConfigDocument;

use crate::error::PersistenceError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::{self, Write};

/// Well-known location of the configuration document.
pub const DEFAULT_CONFIG_PATH: &str = "/conf/config.yaml";

/// Owns the configuration document and its backing file.
///
/// There is one logical document per process, but no global instance: the
/// store is opened explicitly and handed to whoever needs it, either by
/// reference or through [`SharedConfig`](crate::state::SharedConfig).
///
/// The store never validates. Callers run
/// [`Model::perform_validation`](crate::models::Model::perform_validation)
/// and only call [`save`](Self::save) when it returned no messages.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Utf8PathBuf,
    document: ConfigDocument,
}

impl ConfigStore {
    /// Load the document at `path`.
    ///
    /// A missing file yields an empty document so a fresh install can be
    /// populated; an unreadable or malformed file is an error.
    pub fn open<P: AsRef<Utf8Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let document = read_document(&path)?;
        Ok(Self { path, document })
    }

    /// Wrap an in-memory document; nothing is read from `path` until
    /// [`reload`](Self::reload).
    pub fn with_document<P: AsRef<Utf8Path>>(path: P, document: ConfigDocument) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            document,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn object(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn object_mut(&mut self) -> &mut ConfigDocument {
        &mut self.document
    }

    /// Write the whole document back, replacing the file atomically.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let contents = self.document.to_yaml_string()?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        let write_error = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };

        fs::create_dir_all(&parent).map_err(write_error)?;
        let mut temp = tempfile::NamedTempFile::new_in(&parent).map_err(write_error)?;
        temp.write_all(contents.as_bytes()).map_err(write_error)?;
        temp.as_file().sync_all().map_err(write_error)?;
        temp.persist(&self.path).map_err(|e| write_error(e.error))?;

        tracing::info!("Saved configuration to {}", self.path);
        Ok(())
    }

    /// Drop in-memory changes and re-read the backing file.
    pub fn reload(&mut self) -> Result<(), PersistenceError> {
        self.document = read_document(&self.path)?;
        Ok(())
    }
}

fn read_document(path: &Utf8Path) -> Result<ConfigDocument, PersistenceError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!("Configuration not found at {}, starting empty", path);
            return Ok(ConfigDocument::new());
        }
        Err(source) => {
            return Err(PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let root: serde_yaml_ng::Value =
        serde_yaml_ng::from_str(&contents).map_err(|source| PersistenceError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let document = ConfigDocument::from_value(root)?;

    tracing::info!("Loaded configuration from {}", path);
    Ok(document)
}
