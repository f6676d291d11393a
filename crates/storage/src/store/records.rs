#![forbid(unsafe_code)]

use super::{BlobStore, SqliteStore, StoreError};
use rusqlite::{Connection, OptionalExtension, params};
use soi_core::ids::{ProjectId, RecordId};
use soi_core::{Record, RecordInput, RecordType};

impl SqliteStore {
    /// Inserts a record into a project. Image payloads go to the blob store under a key derived
    /// from the new record id; the placeholder row and its final input commit together, so a
    /// failed blob write leaves nothing behind.
    pub fn insert_record(
        &mut self,
        project_id: ProjectId,
        input: RecordInput,
    ) -> Result<Record, StoreError> {
        let now_ms = super::now_ms();
        let tx = self.conn.transaction()?;
        let record_type =
            super::project_record_type(&tx, project_id)?.ok_or(StoreError::UnknownId)?;
        ensure_input_matches(record_type, &input)?;

        let (id, stored_input) = match input {
            RecordInput::Text(text) => {
                tx.execute(
                    "INSERT INTO records(project_id, record_type, input, created_at_ms) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![project_id.get(), record_type.as_str(), text, now_ms],
                )?;
                (RecordId::new(tx.last_insert_rowid()), text)
            }
            RecordInput::Image { mime_type, bytes } => {
                tx.execute(
                    "INSERT INTO records(project_id, record_type, input, created_at_ms) \
                     VALUES (?1, ?2, NULL, ?3)",
                    params![project_id.get(), record_type.as_str(), now_ms],
                )?;
                let id = RecordId::new(tx.last_insert_rowid());
                let key = image_key(id, &mime_type, now_ms)?;
                let reference = self.blobs.put(&key, &bytes).map_err(StoreError::Blob)?;
                if let Err(err) = tx.execute(
                    "UPDATE records SET input=?2 WHERE id=?1",
                    params![id.get(), reference],
                ) {
                    discard_blob(self.blobs.as_ref(), &reference);
                    return Err(err.into());
                }
                (id, reference)
            }
        };

        if let Err(err) = tx.commit() {
            if record_type == RecordType::Image {
                discard_blob(self.blobs.as_ref(), &stored_input);
            }
            return Err(err.into());
        }

        log::debug!("project {project_id}: inserted record {id}");
        Ok(Record {
            id,
            project_id,
            record_type,
            input: stored_input,
            tags: Vec::new(),
        })
    }

    /// Replaces the record input. For images the new blob is written and committed before the
    /// previous blob is deleted; that delete is best-effort.
    pub fn update_record_input(
        &mut self,
        record_id: RecordId,
        input: RecordInput,
    ) -> Result<Record, StoreError> {
        let now_ms = super::now_ms();
        let tx = self.conn.transaction()?;
        let (record_type, previous) =
            record_input_row(&tx, record_id)?.ok_or(StoreError::UnknownId)?;
        ensure_input_matches(record_type, &input)?;

        match input {
            RecordInput::Text(text) => {
                tx.execute(
                    "UPDATE records SET input=?2 WHERE id=?1",
                    params![record_id.get(), text],
                )?;
                tx.commit()?;
            }
            RecordInput::Image { mime_type, bytes } => {
                let key = image_key(record_id, &mime_type, now_ms)?;
                let reference = self.blobs.put(&key, &bytes).map_err(StoreError::Blob)?;
                let replaced = previous.as_deref().filter(|old| *old != reference);
                // A fresh blob has no row pointing at it until the commit.
                let fresh = replaced.is_some() || previous.is_none();

                if fresh {
                    if let Err(err) = tx.execute(
                        "UPDATE records SET input=?2 WHERE id=?1",
                        params![record_id.get(), reference],
                    ) {
                        discard_blob(self.blobs.as_ref(), &reference);
                        return Err(err.into());
                    }
                }
                if let Err(err) = tx.commit() {
                    if fresh {
                        discard_blob(self.blobs.as_ref(), &reference);
                    }
                    return Err(err.into());
                }
                if let Some(old) = replaced {
                    discard_blob(self.blobs.as_ref(), old);
                }
            }
        }

        log::debug!("updated input of record {record_id}");
        get_record(&self.conn, record_id)?.ok_or(StoreError::UnknownId)
    }

    /// Deletes the record and its tag assignments; an image blob is deleted first. Returns
    /// `false` when the record does not exist.
    pub fn remove_record(&mut self, record_id: RecordId) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let Some((record_type, input)) = record_input_row(&tx, record_id)? else {
            return Ok(false);
        };

        if record_type == RecordType::Image {
            if let Some(reference) = input.as_deref() {
                match self.blobs.delete(reference) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        log::warn!("record {record_id}: blob {reference} was already gone");
                    }
                    Err(err) => return Err(StoreError::Blob(err)),
                }
            }
        }

        tx.execute("DELETE FROM records WHERE id=?1", params![record_id.get()])?;
        tx.commit()?;
        log::debug!("removed record {record_id}");
        Ok(true)
    }

    /// One entry per tag name: replaces the value in place or appends a new assignment. The
    /// project vocabulary is not consulted.
    pub fn set_record_tag(
        &mut self,
        record_id: RecordId,
        tag_name: &str,
        tag_value: &str,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        if record_input_row(&tx, record_id)?.is_none() {
            return Err(StoreError::UnknownId);
        }
        tx.execute(
            r#"
            INSERT INTO record_tags(record_id, name, value) VALUES (?1, ?2, ?3)
            ON CONFLICT(record_id, name) DO UPDATE SET value=excluded.value
            "#,
            params![record_id.get(), tag_name, tag_value],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn remove_record_tag(
        &mut self,
        record_id: RecordId,
        tag_name: &str,
    ) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM record_tags WHERE record_id=?1 AND name=?2",
            params![record_id.get(), tag_name],
        )?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn get_record(&self, record_id: RecordId) -> Result<Option<Record>, StoreError> {
        get_record(&self.conn, record_id)
    }

    /// Records of a project in insertion order. Works for deleted projects too, returning the
    /// orphans left behind.
    pub fn list_project_records(&self, project_id: ProjectId) -> Result<Vec<Record>, StoreError> {
        let mut tags = super::record_tags_by_record(
            &self.conn,
            "SELECT t.record_id, t.name, t.value FROM record_tags t \
             JOIN records r ON r.id = t.record_id \
             WHERE r.project_id=?1 ORDER BY t.seq ASC",
            project_id.get(),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT id, record_type, input FROM records WHERE project_id=?1 ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![project_id.get()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id = RecordId::new(row.get::<_, i64>(0)?);
            out.push(Record {
                id,
                project_id,
                record_type: super::parse_record_type(&row.get::<_, String>(1)?)?,
                input: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                tags: tags.remove(&id).unwrap_or_default(),
            });
        }
        Ok(out)
    }
}

fn get_record(conn: &Connection, record_id: RecordId) -> Result<Option<Record>, StoreError> {
    let row = conn
        .query_row(
            "SELECT project_id, record_type, input FROM records WHERE id=?1",
            params![record_id.get()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((project_id, record_type, input)) = row else {
        return Ok(None);
    };

    let mut tags = super::record_tags_by_record(
        conn,
        "SELECT record_id, name, value FROM record_tags WHERE record_id=?1 ORDER BY seq ASC",
        record_id.get(),
    )?;
    Ok(Some(Record {
        id: record_id,
        project_id: ProjectId::new(project_id),
        record_type: super::parse_record_type(&record_type)?,
        input: input.unwrap_or_default(),
        tags: tags.remove(&record_id).unwrap_or_default(),
    }))
}

fn record_input_row(
    conn: &Connection,
    record_id: RecordId,
) -> Result<Option<(RecordType, Option<String>)>, StoreError> {
    let row = conn
        .query_row(
            "SELECT record_type, input FROM records WHERE id=?1",
            params![record_id.get()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
        )
        .optional()?;
    match row {
        Some((record_type, input)) => Ok(Some((super::parse_record_type(&record_type)?, input))),
        None => Ok(None),
    }
}

fn ensure_input_matches(record_type: RecordType, input: &RecordInput) -> Result<(), StoreError> {
    if input.record_type() != record_type {
        return Err(StoreError::InvalidInput(
            "input does not match the project record type",
        ));
    }
    Ok(())
}

/// `img_<record_id>_<ms>.<ext>`: unique per record and write time.
fn image_key(record_id: RecordId, mime_type: &str, now_ms: i64) -> Result<String, StoreError> {
    let extension = image_extension(mime_type)
        .ok_or(StoreError::InvalidInput("unsupported image mime type"))?;
    Ok(format!("img_{record_id}_{now_ms}.{extension}"))
}

fn image_extension(mime_type: &str) -> Option<&'static str> {
    let extensions = mime_guess::get_mime_extensions_str(mime_type.trim())?;
    let subtype = mime_type.trim().rsplit('/').next().unwrap_or_default();
    extensions
        .iter()
        .find(|ext| ext.eq_ignore_ascii_case(subtype))
        .or_else(|| extensions.first())
        .copied()
}

fn discard_blob(blobs: &dyn BlobStore, reference: &str) {
    if let Err(err) = blobs.delete(reference) {
        log::warn!("failed to delete blob {reference}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_keys_embed_record_id_and_time() {
        let key = image_key(RecordId::new(12), "image/png", 1_700).unwrap();
        assert_eq!(key, "img_12_1700.png");
        let key = image_key(RecordId::new(3), "image/jpeg", 5).unwrap();
        assert_eq!(key, "img_3_5.jpeg");
    }

    #[test]
    fn unknown_mime_types_are_rejected() {
        let err = image_key(RecordId::new(1), "application/x-nope", 1).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }
}
