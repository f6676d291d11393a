#![forbid(unsafe_code)]

mod blobs;
mod error;
mod events;
mod projects;
mod records;
mod schema;
mod users;

pub use blobs::{BlobStore, FsBlobStore};
pub use error::StoreError;
pub use projects::TagRemoval;

use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use soi_core::ids::{ProjectId, RecordId};
use soi_core::{RecordTag, RecordType};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE_NAME: &str = "soi.db";
const IMAGES_DIR_NAME: &str = "images";

/// The single owner of persisted state: users, projects, records and events.
///
/// Every mutation runs in one SQLite transaction; callers that share a store across threads
/// wrap it in a lock so there is exactly one writer.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
    blobs: Box<dyn BlobStore>,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let images_dir = storage_dir.as_ref().join(IMAGES_DIR_NAME);
        Self::open_with_blobs(storage_dir, FsBlobStore::new(images_dir))
    }

    pub fn open_with_blobs(
        storage_dir: impl AsRef<Path>,
        blobs: impl BlobStore + 'static,
    ) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE_NAME);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        schema::preflight_gate(&conn)?;
        schema::install_schema(&conn)?;

        log::debug!("opened store at {}", storage_dir.display());
        Ok(Self {
            conn,
            storage_dir,
            blobs: Box::new(blobs),
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

fn project_record_type(
    conn: &Connection,
    project_id: ProjectId,
) -> Result<Option<RecordType>, StoreError> {
    let raw = conn
        .query_row(
            "SELECT record_type FROM projects WHERE id=?1",
            params![project_id.get()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    raw.map(|value| parse_record_type(&value)).transpose()
}

fn ensure_project_exists(conn: &Connection, project_id: ProjectId) -> Result<(), StoreError> {
    match project_record_type(conn, project_id)? {
        Some(_) => Ok(()),
        None => Err(StoreError::UnknownId),
    }
}

fn parse_record_type(value: &str) -> Result<RecordType, StoreError> {
    RecordType::parse(value).map_err(|_| StoreError::InvalidInput("invalid record_type row"))
}

/// Tag assignments for many records at once, each list in assignment order.
fn record_tags_by_record(
    conn: &Connection,
    sql: &str,
    key: i64,
) -> Result<BTreeMap<RecordId, Vec<RecordTag>>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![key])?;
    let mut out: BTreeMap<RecordId, Vec<RecordTag>> = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let record_id = RecordId::new(row.get::<_, i64>(0)?);
        out.entry(record_id).or_default().push(RecordTag {
            name: row.get(1)?,
            value: row.get(2)?,
        });
    }
    Ok(out)
}

fn map_insert_conflict(err: rusqlite::Error, message: &'static str) -> StoreError {
    if is_constraint_violation(&err) {
        return StoreError::Conflict(message);
    }
    StoreError::Sql(err)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn now_ms() -> i64 {
    soi_core::clock::now_ms()
}
