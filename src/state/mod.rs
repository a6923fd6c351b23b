// Shared configuration handle
//
// SharedConfig wraps a ConfigStore in Arc<RwLock<T>> so the document can be
// read and edited from several threads, and emits change events when
// sections are modified, saved or reloaded.

use crate::config::{ConfigDocument, ConfigStore};
use crate::error::PersistenceError;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Events emitted when the shared document changes.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigChange {
    /// A top-level section was added, removed or modified in memory
    SectionChanged { section: String },

    /// The document was written to its backing file
    Saved { path: Utf8PathBuf },

    /// In-memory changes were discarded and the file re-read
    Reloaded,
}

/// Thread-safe handle to the configuration store.
///
/// # Usage
///
/// - [`read()`](Self::read) for reading the document under a shared lock
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`save()`](Self::save) / [`reload()`](Self::reload) for persistence
/// - [`subscribe()`](Self::subscribe) for listening to changes
///
/// A lock poisoned by a panicking writer is recovered instead of propagating
/// the panic; the document is left as the writer left it.
pub struct SharedConfig {
    store: Arc<RwLock<ConfigStore>>,

    /// Multiple subscribers can listen for changes
    change_tx: broadcast::Sender<ConfigChange>,
}

impl SharedConfig {
    /// Wrap an already opened store.
    ///
    /// # Returns
    /// A new SharedConfig with a broadcast channel buffer of 100 events
    pub fn new(store: ConfigStore) -> Self {
        let (change_tx, _) = broadcast::channel(100);
        Self {
            store: Arc::new(RwLock::new(store)),
            change_tx,
        }
    }

    /// Open the store at `path` and share it.
    pub fn open<P: AsRef<Utf8Path>>(path: P) -> Result<Self, PersistenceError> {
        Ok(Self::new(ConfigStore::open(path)?))
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, ConfigStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, ConfigStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> Utf8PathBuf {
        self.read_lock().path().to_path_buf()
    }

    /// Clone of the current document, safe to use without holding locks.
    pub fn snapshot(&self) -> ConfigDocument {
        self.read_lock().object().clone()
    }

    /// Execute a function with read access to the document
    ///
    /// # Example
    /// ```ignore
    /// let port = shared.read(|doc| doc.get_str(&"dnsmasq.port".into()));
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ConfigDocument) -> R,
    {
        let store = self.read_lock();
        f(store.object())
    }

    /// Modify the document and emit a [`ConfigChange::SectionChanged`] for
    /// every top-level section that differs afterwards.
    ///
    /// # Returns
    /// The events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<ConfigChange>
    where
        F: FnOnce(&mut ConfigDocument),
    {
        let changes = {
            let mut store = self.write_lock();
            let old = store.object().clone();
            update_fn(store.object_mut());
            Self::detect_changes(&old, store.object())
        };

        self.emit(&changes);
        changes
    }

    /// Like [`update()`](Self::update), for fallible edits. On error the
    /// document is restored to what it was before the call and nothing is
    /// emitted.
    pub fn try_update<F, E>(&self, update_fn: F) -> Result<Vec<ConfigChange>, E>
    where
        F: FnOnce(&mut ConfigDocument) -> Result<(), E>,
    {
        let changes = {
            let mut store = self.write_lock();
            let old = store.object().clone();
            if let Err(e) = update_fn(store.object_mut()) {
                *store.object_mut() = old;
                return Err(e);
            }
            Self::detect_changes(&old, store.object())
        };

        self.emit(&changes);
        Ok(changes)
    }

    /// Write the document to its backing file.
    ///
    /// Validation is the caller's job and must have passed before this is
    /// called.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let path = {
            let store = self.read_lock();
            store.save()?;
            store.path().to_path_buf()
        };

        let _ = self.change_tx.send(ConfigChange::Saved { path });
        Ok(())
    }

    /// Discard in-memory changes and re-read the backing file.
    pub fn reload(&self) -> Result<(), PersistenceError> {
        self.write_lock().reload()?;
        tracing::debug!("Reloaded shared configuration");
        let _ = self.change_tx.send(ConfigChange::Reloaded);
        Ok(())
    }

    /// Subscribe to change events
    ///
    /// # Returns
    /// A receiver that will receive all future change events
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }

    fn emit(&self, changes: &[ConfigChange]) {
        for change in changes {
            // Ignore send errors (no subscribers is fine)
            let _ = self.change_tx.send(change.clone());
        }
    }

    /// Compare top-level sections of two documents, in the order they appear
    /// in `old` followed by sections only present in `new`.
    fn detect_changes(old: &ConfigDocument, new: &ConfigDocument) -> Vec<ConfigChange> {
        let mut sections = old.section_names();
        for name in new.section_names() {
            if !sections.contains(&name) {
                sections.push(name);
            }
        }

        sections
            .into_iter()
            .filter(|name| old.section(name) != new.section(name))
            .map(|section| ConfigChange::SectionChanged { section })
            .collect()
    }
}

impl Clone for SharedConfig {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            change_tx: self.change_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldPath;
    use serde_yaml_ng::Value;

    fn shared() -> SharedConfig {
        let doc = ConfigDocument::from_yaml_str("system:\n  hostname: fw\ndnsmasq:\n  enable: '0'\n").unwrap();
        SharedConfig::new(ConfigStore::with_document("/nonexistent/config.yaml", doc))
    }

    fn set(doc: &mut ConfigDocument, path: &str, value: &str) {
        doc.set(&FieldPath::parse(path), Value::String(value.to_string()))
            .unwrap();
    }

    #[test]
    fn test_read() {
        let shared = shared();
        let hostname = shared.read(|doc| doc.get_str(&"system.hostname".into()));
        assert_eq!(hostname.as_deref(), Some("fw"));
    }

    #[test]
    fn test_update_reports_changed_sections() {
        let shared = shared();
        let changes = shared.update(|doc| {
            set(doc, "dnsmasq.enable", "1");
            set(doc, "unbound.enabled", "1");
        });

        assert_eq!(
            changes,
            vec![
                ConfigChange::SectionChanged {
                    section: "dnsmasq".to_string()
                },
                ConfigChange::SectionChanged {
                    section: "unbound".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_update_without_change_emits_nothing() {
        let shared = shared();
        let changes = shared.update(|doc| set(doc, "system.hostname", "fw"));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_removed_section_is_a_change() {
        let shared = shared();
        let changes = shared.update(|doc| {
            doc.remove(&"dnsmasq".into());
        });
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_try_update_rolls_back() {
        let shared = shared();
        let mut rx = shared.subscribe();

        let result: Result<_, String> = shared.try_update(|doc| {
            set(doc, "system.hostname", "changed");
            Err("rejected".to_string())
        });

        assert!(result.is_err());
        assert_eq!(
            shared.read(|doc| doc.get_str(&"system.hostname".into())).as_deref(),
            Some("fw")
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_subscribe_to_changes() {
        let shared = shared();
        let mut rx = shared.subscribe();

        shared.update(|doc| set(doc, "system.hostname", "edge"));

        let change = rx.try_recv().unwrap();
        assert_eq!(
            change,
            ConfigChange::SectionChanged {
                section: "system".to_string()
            }
        );
    }

    #[test]
    fn test_clone_shares_store() {
        let shared = shared();
        let clone = shared.clone();

        clone.update(|doc| set(doc, "system.hostname", "edge"));

        assert_eq!(
            shared.read(|doc| doc.get_str(&"system.hostname".into())).as_deref(),
            Some("edge")
        );
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let shared = shared();
        let clone = shared.clone();

        let _ = std::thread::spawn(move || {
            clone.update(|_| panic!("writer panicked"));
        })
        .join();

        assert!(shared.store.is_poisoned());
        assert_eq!(
            shared.read(|doc| doc.get_str(&"system.hostname".into())).as_deref(),
            Some("fw")
        );
    }
}
