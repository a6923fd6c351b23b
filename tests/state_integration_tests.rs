//! Integration tests for SharedConfig with change events
//!
//! These tests verify that SharedConfig correctly:
//! - Emits section change events on mutations
//! - Emits save and reload events
//! - Supports multiple subscribers
//! - Handles concurrent access from multiple tasks

use camino::Utf8PathBuf;
use fwconfig::{
    ConfigChange, ConfigDocument, ConfigStore, FieldPath, Model, PersistenceError, SharedConfig, Unbound,
};
use serde_yaml_ng::Value;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::time::{Duration, timeout};

fn create_shared() -> (TempDir, SharedConfig) {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let path = dir.join("config.yaml");
    fs::write(&path, "system:\n  hostname: fw\ndnsmasq:\n  enable: '1'\n").unwrap();
    let shared = SharedConfig::open(&path).unwrap();
    (temp_dir, shared)
}

fn set(doc: &mut ConfigDocument, path: &str, value: &str) {
    doc.set(&FieldPath::parse(path), Value::String(value.to_string()))
        .unwrap();
}

#[tokio::test]
async fn test_section_change_event_emitted() {
    let (_temp_dir, shared) = create_shared();
    let mut rx = shared.subscribe();

    shared.update(|doc| set(doc, "dnsmasq.enable", "0"));

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");

    assert_eq!(
        event,
        ConfigChange::SectionChanged {
            section: "dnsmasq".to_string()
        }
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let (_temp_dir, shared) = create_shared();
    let mut rx1 = shared.subscribe();
    let mut rx2 = shared.subscribe();

    shared.update(|doc| set(doc, "system.hostname", "edge"));

    let event1 = timeout(Duration::from_millis(100), rx1.recv())
        .await
        .expect("Timeout on rx1")
        .expect("rx1 closed");
    let event2 = timeout(Duration::from_millis(100), rx2.recv())
        .await
        .expect("Timeout on rx2")
        .expect("rx2 closed");

    assert_eq!(event1, event2);
}

#[tokio::test]
async fn test_save_and_reload_events() {
    let (_temp_dir, shared) = create_shared();
    let mut rx = shared.subscribe();

    shared.save().unwrap();
    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for save")
        .expect("Channel closed");
    assert_eq!(event, ConfigChange::Saved { path: shared.path() });

    shared.reload().unwrap();
    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for reload")
        .expect("Channel closed");
    assert_eq!(event, ConfigChange::Reloaded);
}

#[tokio::test]
async fn test_reload_discards_unsaved_update() {
    let (_temp_dir, shared) = create_shared();

    shared.update(|doc| set(doc, "system.hostname", "unsaved"));
    shared.reload().unwrap();

    let hostname = shared.read(|doc| doc.get_str(&FieldPath::parse("system.hostname")));
    assert_eq!(hostname.as_deref(), Some("fw"));
}

#[tokio::test]
async fn test_concurrent_updates() {
    let (_temp_dir, shared) = create_shared();
    let shared = Arc::new(shared);

    let mut handles = vec![];
    for i in 0..10 {
        let shared_clone = shared.clone();
        let handle = tokio::spawn(async move {
            shared_clone.update(|doc| set(doc, &format!("tunables.item{}", i), "1"));
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let count = shared.read(|doc| {
        doc.section("tunables")
            .and_then(Value::as_mapping)
            .map(|m| m.len())
            .unwrap_or(0)
    });
    assert_eq!(count, 10);
}

#[tokio::test]
async fn test_model_edit_through_shared_config() {
    let (_temp_dir, shared) = create_shared();
    let mut rx = shared.subscribe();

    let mut model = Unbound::new().unwrap();
    shared.read(|doc| model.load(doc)).unwrap();
    model
        .root_mut()
        .set_value(&FieldPath::parse("general.port"), "5353")
        .unwrap();

    let messages = shared.read(|doc| model.perform_validation(doc, false)).unwrap();
    assert!(messages.is_empty());

    let changes = shared
        .try_update(|doc| model.serialize_to_config(doc))
        .unwrap();
    assert_eq!(
        changes,
        vec![ConfigChange::SectionChanged {
            section: "OPNsense".to_string()
        }]
    );
    shared.save().unwrap();
    model.commit();

    let first = rx.try_recv().unwrap();
    let second = rx.try_recv().unwrap();
    assert_eq!(first, changes[0]);
    assert!(matches!(second, ConfigChange::Saved { .. }));

    let on_disk = SharedConfig::open(shared.path()).unwrap();
    let port = on_disk.read(|doc| doc.get_str(&FieldPath::parse("OPNsense.unboundplus.general.port")));
    assert_eq!(port.as_deref(), Some("5353"));
}

#[tokio::test]
async fn test_failed_save_emits_no_event() {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let blocker = dir.join("blocker");
    fs::write(&blocker, "plain file").unwrap();

    let store = ConfigStore::with_document(blocker.join("config.yaml"), ConfigDocument::new());
    let shared = SharedConfig::new(store);
    let mut rx = shared.subscribe();

    assert!(matches!(shared.save(), Err(PersistenceError::Write { .. })));
    assert!(rx.try_recv().is_err());
}
