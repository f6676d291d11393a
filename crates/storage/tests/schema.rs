use rusqlite::Connection;
use soi_core::RecordType;
use soi_core::error::ErrorKind;
use soi_storage::{SqliteStore, StoreError};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_storage_dir(label: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be monotonic enough for tests")
        .as_nanos();
    path.push(format!("soi-storage-{label}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&path).expect("temp storage dir must be creatable");
    path
}

#[test]
fn storage_open_is_fail_closed_on_foreign_schema() {
    let dir = temp_storage_dir("foreign-schema");
    let conn = Connection::open(dir.join("soi.db")).expect("legacy db must open");
    conn.execute("CREATE TABLE legacy_records(id TEXT PRIMARY KEY)", [])
        .expect("legacy table should be created");
    drop(conn);

    let err = SqliteStore::open(&dir).expect_err("foreign storage must be rejected");
    assert_eq!(err.code(), "RESET_REQUIRED");
    assert!(matches!(err, StoreError::ResetRequired(_)));
}

#[test]
fn storage_survives_reopen() {
    let dir = temp_storage_dir("reopen");
    {
        let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
        store
            .create_project("Pokemon", RecordType::Text)
            .expect("project should be created");
    }

    let store = SqliteStore::open(&dir).expect("existing storage should reopen");
    let projects = store.list_projects().expect("projects should list");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].title, "Pokemon");
    assert_eq!(store.storage_dir(), dir.as_path());
}

#[test]
fn error_kinds_map_to_stable_codes() {
    assert_eq!(StoreError::UnknownId.kind(), ErrorKind::NotFound);
    assert_eq!(StoreError::UnknownId.code(), "NOT_FOUND");
    assert_eq!(StoreError::Conflict("x").code(), "CONFLICT");
    assert_eq!(StoreError::InvalidInput("x").kind(), ErrorKind::InvalidArgument);
    assert_eq!(StoreError::WrongPassword.kind(), ErrorKind::Unauthorized);
    assert_eq!(
        StoreError::Blob(std::io::Error::other("disk full")).kind(),
        ErrorKind::IoError
    );
    assert_eq!(
        StoreError::Sql(rusqlite::Error::QueryReturnedNoRows).kind(),
        ErrorKind::IoError
    );
    let reset = StoreError::ResetRequired("x");
    assert_eq!(reset.kind(), ErrorKind::IoError);
    assert_eq!(reset.code(), "RESET_REQUIRED");
}
