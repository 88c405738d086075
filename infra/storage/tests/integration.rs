use tempfile::TempDir;
use wheel_storage::*;

async fn storage(temp: &TempDir) -> Storage {
    Storage::builder().root(temp.path()).connect().await.unwrap()
}

#[tokio::test]
async fn test_path_traversal_blocked() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp).await;

    assert!(storage.resolve("../etc/passwd").is_err());
    assert!(storage.resolve("objects/../../bar").is_err());
    assert!(storage.resolve("/etc/passwd").is_err());
    assert!(storage.resolve("objects/../objects/id").is_ok());
}

#[tokio::test]
async fn test_write_read_roundtrip() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp).await;

    let payload = b"hello world";
    storage.write("objects/abc", payload).await.unwrap();
    assert!(storage.exists("objects/abc").await.unwrap());
    assert_eq!(storage.read("objects/abc").await.unwrap(), payload);

    storage.write("objects/abc", b"").await.unwrap();
    assert!(storage.read("objects/abc").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_write_leaves_no_temp_files() {
    let temp = TempDir::new().unwrap();
    let storage = Storage::builder().root(temp.path()).sync(false).connect().await.unwrap();

    for i in 0..5u8 {
        storage.write("meta.json", &[i]).await.unwrap();
    }

    let names: Vec<String> = std::fs::read_dir(temp.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["meta.json".to_owned()]);
}

#[tokio::test]
async fn test_write_onto_directory_fails_and_cleans_up() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp).await;
    std::fs::create_dir_all(temp.path().join("objects/blocked")).unwrap();

    let err = storage.write("objects/blocked", b"x").await.expect_err("rename must fail");
    assert!(matches!(err, StorageError::Io { .. }), "unexpected error: {err:?}");

    let leftovers = std::fs::read_dir(temp.path().join("objects")).unwrap().count();
    assert_eq!(leftovers, 1, "temp file must be discarded after a failed swap");
}

#[tokio::test]
async fn test_create_empty_keeps_existing_content() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp).await;

    assert!(storage.create_empty("objects/a").await.unwrap());
    storage.write("objects/a", b"kept").await.unwrap();
    assert!(!storage.create_empty("objects/a").await.unwrap());
    assert_eq!(storage.read("objects/a").await.unwrap(), b"kept");
}

#[tokio::test]
async fn test_create_empty_rejects_directory() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp).await;
    assert!(storage.create_dir("objects/dir").await.unwrap());

    let err = storage.create_empty("objects/dir").await.expect_err("expected error");
    assert!(matches!(err, StorageError::NotAFile { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_create_dir_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp).await;

    assert!(storage.create_dir("objects").await.unwrap());
    assert!(!storage.create_dir("objects").await.unwrap());
    assert!(temp.path().join("objects").is_dir());
}

#[tokio::test]
async fn test_create_dir_rejects_regular_file() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp).await;
    std::fs::write(temp.path().join("objects"), b"occupied").unwrap();

    let err = storage.create_dir("objects").await.unwrap_err();

    assert!(matches!(err, StorageError::NotADirectory { .. }), "unexpected error: {err:?}");
    assert!(temp.path().join("objects").is_file());
}

#[tokio::test]
async fn test_delete_and_exists() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp).await;

    storage.write("objects/file", b"x").await.unwrap();
    storage.delete("objects/file").await.unwrap();
    assert!(!storage.exists("objects/file").await.unwrap());

    let err = storage.delete("objects/file").await.expect_err("second delete must fail");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_read_missing_returns_file_not_found() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp).await;

    let err = storage.read("missing.bin").await.expect_err("expected error");
    match err {
        StorageError::FileNotFound { .. } => {},
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_connect_without_create_requires_root() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("absent");

    let err = Storage::builder().root(&missing).create(false).connect().await;
    assert!(matches!(err, Err(StorageError::Io { .. })));
}

#[tokio::test]
async fn test_connect_rejects_file_as_root() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("base");
    std::fs::write(&file, b"not a directory").unwrap();

    let err = Storage::builder().root(&file).create(false).connect().await.unwrap_err();
    assert!(matches!(err, StorageError::NotADirectory { .. }), "unexpected error: {err:?}");
    assert_eq!(std::fs::read(&file).unwrap(), b"not a directory");
}

#[tokio::test]
async fn test_connect_purges_stale_temp_files() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("objects")).unwrap();
    std::fs::write(temp.path().join("objects/x.wheeltmp.9.9"), b"orphan").unwrap();

    let _storage = Storage::builder()
        .root(temp.path())
        .tmp_max_age(std::time::Duration::ZERO)
        .connect()
        .await
        .unwrap();

    assert!(!temp.path().join("objects/x.wheeltmp.9.9").exists());
}
