mod common;
use common::{tmp_dir, ENV_LOCK};

use opsdeck::errors::OpsErrorKind;
use opsdeck::services::credentials::CredentialStore;
use opsdeck::services::logger::Logger;
use opsdeck::services::security::Security;
use std::sync::Arc;

fn build_store(dir: &std::path::Path) -> CredentialStore {
    std::fs::create_dir_all(dir).expect("create dir");
    let security = Arc::new(Security::new(&dir.join(".opsdeck.key")).expect("security"));
    CredentialStore::new(Logger::new("test"), security, dir.join("credentials.json"))
        .expect("credential store")
}

#[tokio::test]
async fn secret_round_trips_through_encryption() {
    let _guard = ENV_LOCK.lock().await;

    let dir = tmp_dir("opsdeck-cred");
    let store = build_store(&dir);

    store.save(1, "s3cret", None).expect("save");
    let credential = store.load(1);
    assert_eq!(credential.password, "s3cret");
    assert_eq!(credential.key_file_path, None);
}

#[tokio::test]
async fn empty_secret_round_trips_empty() {
    let _guard = ENV_LOCK.lock().await;

    let dir = tmp_dir("opsdeck-cred");
    let store = build_store(&dir);

    store.save(1, "", Some("/home/ops/.ssh/id_ed25519")).expect("save");
    let credential = store.load(1);
    assert_eq!(credential.password, "");
    assert_eq!(
        credential.key_file_path.as_deref(),
        Some("/home/ops/.ssh/id_ed25519")
    );
}

#[tokio::test]
async fn secret_is_not_stored_in_plaintext() {
    let _guard = ENV_LOCK.lock().await;

    let dir = tmp_dir("opsdeck-cred");
    let store = build_store(&dir);

    store.save(7, "hunter2-super-secret", None).expect("save");
    let raw = std::fs::read_to_string(dir.join("credentials.json")).expect("read file");
    assert!(
        !raw.contains("hunter2-super-secret"),
        "password must be encrypted at rest"
    );
}

#[tokio::test]
async fn corrupt_row_degrades_to_empty_password() {
    let _guard = ENV_LOCK.lock().await;

    let dir = tmp_dir("opsdeck-cred");
    {
        let store = build_store(&dir);
        store.save(3, "s3cret", None).expect("save");
    }

    let path = dir.join("credentials.json");
    let raw = std::fs::read_to_string(&path).expect("read file");
    let mut doc: serde_json::Value = serde_json::from_str(&raw).expect("parse file");
    doc["3"]["password"] = serde_json::Value::String("deadbeef:feed:garbage".to_string());
    std::fs::write(&path, serde_json::to_string_pretty(&doc).expect("serialize")).expect("write");

    let store = build_store(&dir);
    let credential = store.load(3);
    assert_eq!(credential.password, "", "corrupt payload must degrade, not fail");
}

#[tokio::test]
async fn load_of_unknown_profile_is_empty() {
    let _guard = ENV_LOCK.lock().await;

    let dir = tmp_dir("opsdeck-cred");
    let store = build_store(&dir);

    let credential = store.load(42);
    assert_eq!(credential.password, "");
    assert_eq!(credential.key_file_path, None);
}

#[tokio::test]
async fn remove_is_idempotent() {
    let _guard = ENV_LOCK.lock().await;

    let dir = tmp_dir("opsdeck-cred");
    let store = build_store(&dir);

    store.save(5, "s3cret", None).expect("save");
    store.remove(5).expect("first remove");
    store.remove(5).expect("second remove");
    assert_eq!(store.load(5).password, "");
}

#[cfg(unix)]
#[tokio::test]
async fn key_file_has_restrictive_permissions() {
    let _guard = ENV_LOCK.lock().await;

    let dir = tmp_dir("opsdeck-cred");
    let _store = build_store(&dir);

    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(dir.join(".opsdeck.key"))
        .expect("key metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn key_init_fails_when_directory_is_unwritable() {
    let _guard = ENV_LOCK.lock().await;

    let dir = tmp_dir("opsdeck-cred");
    std::fs::create_dir_all(&dir).expect("create dir");
    let blocker = dir.join("blocker");
    std::fs::write(&blocker, "not a directory").expect("write blocker");

    let err = Security::new(&blocker.join("key")).expect_err("key init must fail");
    assert_eq!(err.kind, OpsErrorKind::KeyInit);
}
