#![forbid(unsafe_code)]

use super::StoreError;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;

const SCHEMA_VERSION: &str = "1";

const REQUIRED_TABLES: [&str; 8] = [
    "meta",
    "users",
    "projects",
    "project_tags",
    "project_tag_values",
    "records",
    "record_tags",
    "events",
];

/// Refuses to open a database that was not created by this schema.
pub(super) fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = REQUIRED_TABLES.into_iter().collect();
    if tables
        .iter()
        .any(|table| !required.contains(table.as_str()))
    {
        return Err(StoreError::ResetRequired("unsupported tables detected"));
    }
    if required.iter().any(|table| !tables.contains(*table)) {
        return Err(StoreError::ResetRequired("required table is missing"));
    }

    let version = conn
        .query_row(
            "SELECT value FROM meta WHERE key='schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    match version.as_deref() {
        Some(SCHEMA_VERSION) => Ok(()),
        _ => Err(StoreError::ResetRequired("unsupported schema version")),
    }
}

pub(super) fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          username TEXT NOT NULL UNIQUE,
          password TEXT NOT NULL,
          token_hash TEXT,
          token_issued_at_ms INTEGER,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          title TEXT NOT NULL UNIQUE,
          record_type TEXT NOT NULL CHECK(record_type IN ('Text', 'Image')),
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS project_tags (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          project_id INTEGER NOT NULL,
          name TEXT NOT NULL,
          UNIQUE(project_id, name),
          FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS project_tag_values (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          project_id INTEGER NOT NULL,
          tag_name TEXT NOT NULL,
          value TEXT NOT NULL,
          UNIQUE(project_id, tag_name, value),
          FOREIGN KEY(project_id, tag_name)
            REFERENCES project_tags(project_id, name)
            ON DELETE CASCADE
        );

        -- No foreign key on project_id: records outlive a deleted project.
        CREATE TABLE IF NOT EXISTS records (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          project_id INTEGER NOT NULL,
          record_type TEXT NOT NULL CHECK(record_type IN ('Text', 'Image')),
          input TEXT,
          created_at_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_records_project ON records(project_id, id);

        CREATE TABLE IF NOT EXISTS record_tags (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          record_id INTEGER NOT NULL,
          name TEXT NOT NULL,
          value TEXT NOT NULL,
          UNIQUE(record_id, name),
          FOREIGN KEY(record_id) REFERENCES records(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS events (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          user_id INTEGER NOT NULL,
          project_id INTEGER,
          record_id INTEGER,
          action TEXT NOT NULL,
          info_json TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_user ON events(user_id, id);
        CREATE INDEX IF NOT EXISTS idx_events_project ON events(project_id, id);
        CREATE INDEX IF NOT EXISTS idx_events_record ON events(record_id, id);
        "#,
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params!["schema_version", SCHEMA_VERSION],
    )?;
    Ok(())
}
