#![forbid(unsafe_code)]

use super::{SqliteStore, StoreError};
use rusqlite::{OptionalExtension, params};
use soi_core::ids::{EventId, ProjectId, RecordId, UserId};
use soi_core::{Event, EventFilter, NewEvent, SortOrder};

impl SqliteStore {
    /// Appends to the audit log. The timestamp is assigned here and never goes backwards, so
    /// id order and time order agree.
    pub fn append_event(&mut self, event: NewEvent) -> Result<Event, StoreError> {
        let info_json = serde_json::to_string(&event.info)?;
        let tx = self.conn.transaction()?;
        let last_ts_ms: Option<i64> = tx
            .query_row(
                "SELECT created_at_ms FROM events ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let created_at_ms = super::now_ms().max(last_ts_ms.unwrap_or(0));

        tx.execute(
            r#"
            INSERT INTO events(user_id, project_id, record_id, action, info_json, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                event.user_id.get(),
                event.project_id.map(ProjectId::get),
                event.record_id.map(RecordId::get),
                event.action,
                info_json,
                created_at_ms
            ],
        )?;
        let id = EventId::new(tx.last_insert_rowid());
        tx.commit()?;

        Ok(Event {
            id,
            user_id: event.user_id,
            project_id: event.project_id,
            record_id: event.record_id,
            action: event.action,
            info: event.info,
            created_at_ms,
        })
    }

    pub fn events_by(&self, filter: EventFilter, order: SortOrder) -> Result<Vec<Event>, StoreError> {
        let (column, key) = match filter {
            EventFilter::User(id) => ("user_id", id.get()),
            EventFilter::Project(id) => ("project_id", id.get()),
            EventFilter::Record(id) => ("record_id", id.get()),
        };
        let sql = format!(
            "SELECT id, user_id, project_id, record_id, action, info_json, created_at_ms \
             FROM events WHERE {column}=?1 ORDER BY id {}",
            order.as_sql()
        );
        self.query_events(&sql, params![key])
    }

    pub fn list_events(&self, order: SortOrder) -> Result<Vec<Event>, StoreError> {
        let sql = format!(
            "SELECT id, user_id, project_id, record_id, action, info_json, created_at_ms \
             FROM events ORDER BY id {}",
            order.as_sql()
        );
        self.query_events(&sql, [])
    }

    fn query_events(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Event>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let info_json = row.get::<_, String>(5)?;
            out.push(Event {
                id: EventId::new(row.get(0)?),
                user_id: UserId::new(row.get(1)?),
                project_id: row.get::<_, Option<i64>>(2)?.map(ProjectId::new),
                record_id: row.get::<_, Option<i64>>(3)?.map(RecordId::new),
                action: row.get(4)?,
                info: serde_json::from_str(&info_json)?,
                created_at_ms: row.get(6)?,
            });
        }
        Ok(out)
    }
}
