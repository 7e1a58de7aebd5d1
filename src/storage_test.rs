use super::*;

// =============================================================================
// MemoryStore
// =============================================================================

#[test]
fn memory_store_missing_key_is_none() {
    let store = MemoryStore::new();
    assert_eq!(store.get(AUTH_USER_KEY).unwrap(), None);
}

#[test]
fn memory_store_set_then_get() {
    let store = MemoryStore::new();
    store.set(AUTH_TOKENS_KEY, "{}").unwrap();
    assert_eq!(store.get(AUTH_TOKENS_KEY).unwrap().as_deref(), Some("{}"));
}

#[test]
fn memory_store_remove_absent_key_is_ok() {
    let store = MemoryStore::new();
    assert!(store.remove("nothing").is_ok());
}

#[test]
fn memory_store_set_overwrites() {
    let store = MemoryStore::new();
    store.set("k", "a").unwrap();
    store.set("k", "b").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("b"));
}

// =============================================================================
// valid_key
// =============================================================================

#[test]
fn valid_key_accepts_auth_keys() {
    assert!(valid_key(AUTH_USER_KEY));
    assert!(valid_key(AUTH_TOKENS_KEY));
    assert!(valid_key("with-dash"));
}

#[test]
fn valid_key_rejects_paths_and_empty() {
    assert!(!valid_key(""));
    assert!(!valid_key("../etc/passwd"));
    assert!(!valid_key("a/b"));
    assert!(!valid_key("a.b"));
}

// =============================================================================
// FileStore
// =============================================================================

#[test]
fn file_store_creates_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("nested").join("state");
    let store = FileStore::open(&dir).unwrap();
    assert!(dir.is_dir());
    assert_eq!(store.dir(), dir.as_path());
}

#[test]
fn file_store_round_trips_value_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::open(tmp.path()).unwrap();

    store.set(AUTH_USER_KEY, r#"{"userId":"u1"}"#).unwrap();

    let on_disk = std::fs::read_to_string(tmp.path().join("auth_user.json")).unwrap();
    assert_eq!(on_disk, r#"{"userId":"u1"}"#);
    assert_eq!(store.get(AUTH_USER_KEY).unwrap().as_deref(), Some(r#"{"userId":"u1"}"#));
}

#[test]
fn file_store_leaves_no_temp_file_behind() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::open(tmp.path()).unwrap();
    store.set(AUTH_TOKENS_KEY, "{}").unwrap();

    let names: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["auth_tokens.json".to_owned()]);
}

#[test]
fn file_store_missing_and_removed_keys_are_none() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::open(tmp.path()).unwrap();
    assert_eq!(store.get(AUTH_USER_KEY).unwrap(), None);

    store.set(AUTH_USER_KEY, "x").unwrap();
    store.remove(AUTH_USER_KEY).unwrap();
    assert_eq!(store.get(AUTH_USER_KEY).unwrap(), None);
    assert!(store.remove(AUTH_USER_KEY).is_ok());
}

#[test]
fn file_store_persists_across_instances() {
    let tmp = tempfile::tempdir().unwrap();
    FileStore::open(tmp.path()).unwrap().set("k", "v").unwrap();
    let reopened = FileStore::open(tmp.path()).unwrap();
    assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
}

#[test]
fn file_store_rejects_invalid_key() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::open(tmp.path()).unwrap();
    assert!(matches!(store.set("../x", "v"), Err(StorageError::InvalidKey(_))));
}
