#![forbid(unsafe_code)]

use super::{SqliteStore, StoreError};
use rusqlite::{Connection, OptionalExtension, params};
use soi_core::ids::ProjectId;
use soi_core::{Project, ProjectStatus, ProjectSummary, RecordType, Tag};

/// Outcome of a vocabulary removal and its cascade into records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TagRemoval {
    pub vocabulary_changed: bool,
    pub records_updated: usize,
}

impl SqliteStore {
    pub fn is_project_title_taken(&self, title: &str) -> Result<bool, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM projects WHERE title=?1",
                params![title],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some())
    }

    pub fn create_project(
        &mut self,
        title: &str,
        record_type: RecordType,
    ) -> Result<Project, StoreError> {
        let now_ms = super::now_ms();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO projects(title, record_type, created_at_ms) VALUES (?1, ?2, ?3)",
            params![title, record_type.as_str(), now_ms],
        )
        .map_err(|err| super::map_insert_conflict(err, "project title is already taken"))?;
        let id = ProjectId::new(tx.last_insert_rowid());
        tx.commit()?;

        log::debug!("created project {id} ({})", record_type.as_str());
        Ok(Project {
            id,
            title: title.to_string(),
            record_type,
            tags: Vec::new(),
        })
    }

    /// Deletes the project and its vocabulary. Its records are left in place with a dangling
    /// `project_id`.
    pub fn delete_project(&mut self, id: ProjectId) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM projects WHERE id=?1", params![id.get()])?;
        if deleted == 0 {
            return Err(StoreError::UnknownId);
        }
        tx.commit()?;
        log::debug!("deleted project {id}");
        Ok(())
    }

    pub fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        load_project(&self.conn, id)
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title FROM projects ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(ProjectSummary {
                id: ProjectId::new(row.get(0)?),
                title: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Returns `false` when the tag already existed.
    pub fn add_project_tag(&mut self, id: ProjectId, tag_name: &str) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        super::ensure_project_exists(&tx, id)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO project_tags(project_id, name) VALUES (?1, ?2)",
            params![id.get(), tag_name],
        )?;
        tx.commit()?;
        Ok(inserted > 0)
    }

    /// Removes the tag from the vocabulary and strips it from every record of the project,
    /// in one transaction.
    pub fn remove_project_tag(
        &mut self,
        id: ProjectId,
        tag_name: &str,
    ) -> Result<TagRemoval, StoreError> {
        let tx = self.conn.transaction()?;
        super::ensure_project_exists(&tx, id)?;

        // Values go with the tag through the foreign key.
        let removed = tx.execute(
            "DELETE FROM project_tags WHERE project_id=?1 AND name=?2",
            params![id.get(), tag_name],
        )?;
        let records_updated = tx.execute(
            "DELETE FROM record_tags \
             WHERE name=?2 AND record_id IN (SELECT id FROM records WHERE project_id=?1)",
            params![id.get(), tag_name],
        )?;
        tx.commit()?;

        log::debug!(
            "project {id}: removed tag {tag_name:?}, stripped from {records_updated} records"
        );
        Ok(TagRemoval {
            vocabulary_changed: removed > 0,
            records_updated,
        })
    }

    /// No-op when the tag does not exist or already permits `value`.
    pub fn add_project_tag_value(
        &mut self,
        id: ProjectId,
        tag_name: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        super::ensure_project_exists(&tx, id)?;
        if !tag_exists(&tx, id, tag_name)? {
            return Ok(false);
        }
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO project_tag_values(project_id, tag_name, value) \
             VALUES (?1, ?2, ?3)",
            params![id.get(), tag_name, value],
        )?;
        tx.commit()?;
        Ok(inserted > 0)
    }

    /// Removes `value` from the tag and strips every record assignment `tag_name=value` of
    /// the project, in one transaction.
    pub fn remove_project_tag_value(
        &mut self,
        id: ProjectId,
        tag_name: &str,
        value: &str,
    ) -> Result<TagRemoval, StoreError> {
        let tx = self.conn.transaction()?;
        super::ensure_project_exists(&tx, id)?;

        let removed = tx.execute(
            "DELETE FROM project_tag_values WHERE project_id=?1 AND tag_name=?2 AND value=?3",
            params![id.get(), tag_name, value],
        )?;
        let records_updated = tx.execute(
            "DELETE FROM record_tags \
             WHERE name=?2 AND value=?3 \
               AND record_id IN (SELECT id FROM records WHERE project_id=?1)",
            params![id.get(), tag_name, value],
        )?;
        tx.commit()?;

        log::debug!(
            "project {id}: removed {tag_name}={value:?}, stripped from {records_updated} records"
        );
        Ok(TagRemoval {
            vocabulary_changed: removed > 0,
            records_updated,
        })
    }

    pub fn project_status(&self, id: ProjectId) -> Result<ProjectStatus, StoreError> {
        let project = load_project(&self.conn, id)?.ok_or(StoreError::UnknownId)?;
        let records = self.list_project_records(id)?;
        Ok(ProjectStatus::tally(&project, &records))
    }
}

fn tag_exists(conn: &Connection, id: ProjectId, tag_name: &str) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM project_tags WHERE project_id=?1 AND name=?2",
            params![id.get(), tag_name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

fn load_project(conn: &Connection, id: ProjectId) -> Result<Option<Project>, StoreError> {
    let row = conn
        .query_row(
            "SELECT title, record_type FROM projects WHERE id=?1",
            params![id.get()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    let Some((title, record_type)) = row else {
        return Ok(None);
    };

    let mut tags: Vec<Tag> = Vec::new();
    {
        let mut stmt =
            conn.prepare("SELECT name FROM project_tags WHERE project_id=?1 ORDER BY seq ASC")?;
        let mut rows = stmt.query(params![id.get()])?;
        while let Some(row) = rows.next()? {
            tags.push(Tag {
                name: row.get(0)?,
                values: Vec::new(),
            });
        }
    }
    {
        let mut stmt = conn.prepare(
            "SELECT tag_name, value FROM project_tag_values WHERE project_id=?1 ORDER BY seq ASC",
        )?;
        let mut rows = stmt.query(params![id.get()])?;
        while let Some(row) = rows.next()? {
            let tag_name = row.get::<_, String>(0)?;
            let value = row.get::<_, String>(1)?;
            if let Some(tag) = tags.iter_mut().find(|tag| tag.name == tag_name) {
                tag.values.push(value);
            }
        }
    }

    Ok(Some(Project {
        id,
        title,
        record_type: super::parse_record_type(&record_type)?,
        tags,
    }))
}
