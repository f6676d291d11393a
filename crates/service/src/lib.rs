#![forbid(unsafe_code)]

//! Token-guarded operations over a [`SqliteStore`].
//!
//! Every mutation authorizes the presented token against the stored hash, runs the store
//! operation and appends an audit event, all under one lock. Reads are not guarded.

pub mod config;
mod error;

pub use config::ServiceConfig;
pub use error::ServiceError;

use serde::Serialize;
use serde_json::{Value, json};
use soi_core::clock::{Clock, SystemClock};
use soi_core::ids::{ProjectId, RecordId, UserId};
use soi_core::token::{PresentedToken, Token, TokenService};
use soi_core::{
    Event, EventFilter, NewEvent, Project, ProjectStatus, ProjectSummary, Record, RecordInput,
    RecordType, SortOrder, UserSummary,
};
use soi_storage::{FsBlobStore, SqliteStore, StoreError, TagRemoval};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The authenticated caller behind a valid token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
}

pub struct Service<C = SystemClock> {
    store: Mutex<SqliteStore>,
    tokens: TokenService<C>,
}

impl Service<SystemClock> {
    pub fn open(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let blobs = FsBlobStore::new(&config.images_dir);
        let store = SqliteStore::open_with_blobs(&config.storage_dir, blobs)?;
        Ok(Self::new(store, SystemClock))
    }
}

impl<C: Clock> Service<C> {
    pub fn new(store: SqliteStore, clock: C) -> Self {
        Self {
            store: Mutex::new(store),
            tokens: TokenService::with_clock(clock),
        }
    }

    // Store mutations are transactional, so a panic elsewhere cannot leave it half-written.
    fn store(&self) -> MutexGuard<'_, SqliteStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a user and issues their first token.
    pub fn sign_in(&self, username: &str, password: &str) -> Result<Token, ServiceError> {
        ensure_non_blank(username, "username must not be blank")?;
        ensure_non_blank(password, "password must not be blank")?;

        let mut store = self.store();
        store.register_user(username, password)?;
        let token = self.tokens.generate(username, password);
        store.set_token(&token)?;
        log::debug!("registered user {username}");
        Ok(token)
    }

    /// Checks credentials and issues a fresh token, revoking the previous one.
    pub fn log_in(&self, username: &str, password: &str) -> Result<Token, ServiceError> {
        let mut store = self.store();
        let user = store.authenticate(username, password)?;
        let token = self.tokens.generate(&user.username, &user.password);
        store.set_token(&token)?;
        Ok(token)
    }

    /// Exchanges a valid token for a new one; the presented token stops working.
    pub fn renew(&self, token: &PresentedToken) -> Result<Token, ServiceError> {
        let mut store = self.store();
        let session = self.authorize_in(&store, token)?;
        let user = store
            .get_user(session.user_id)?
            .ok_or(ServiceError::Unauthorized("token owner no longer exists"))?;
        let current = token
            .complete()
            .ok_or(ServiceError::Unauthorized("token is incomplete"))?;
        let renewed = self.tokens.renew(&current, &user.password);
        store.set_token(&renewed)?;
        Ok(renewed)
    }

    pub fn authorize(&self, token: &PresentedToken) -> Result<Session, ServiceError> {
        let store = self.store();
        self.authorize_in(&store, token)
    }

    fn authorize_in(
        &self,
        store: &SqliteStore,
        token: &PresentedToken,
    ) -> Result<Session, ServiceError> {
        let valid = self
            .tokens
            .validate(token, |identity| store.token_hash(identity))?;
        if !valid {
            log::warn!(
                "rejected token for {}",
                token.identity.as_deref().unwrap_or("<missing>")
            );
            return Err(ServiceError::Unauthorized(
                "token is missing, expired or revoked",
            ));
        }

        let identity = token.identity.as_deref().unwrap_or_default();
        let user = store
            .user_by_username(identity)?
            .ok_or(ServiceError::Unauthorized("token owner no longer exists"))?;
        Ok(Session {
            user_id: user.id,
            username: user.username,
        })
    }

    /// Runs `op` for an authorized caller and records `action` with the returned info.
    fn guarded<T>(
        &self,
        token: &PresentedToken,
        action: &str,
        op: impl FnOnce(&mut SqliteStore) -> Result<(T, Subject), StoreError>,
    ) -> Result<T, ServiceError> {
        let mut store = self.store();
        let session = self.authorize_in(&store, token)?;
        let (out, subject) = op(&mut store)?;
        store.append_event(NewEvent {
            user_id: session.user_id,
            project_id: subject.project_id,
            record_id: subject.record_id,
            action: action.to_string(),
            info: subject.info,
        })?;
        log::debug!("{} by {}", action, session.username);
        Ok(out)
    }

    pub fn create_project(
        &self,
        token: &PresentedToken,
        title: &str,
        record_type: RecordType,
    ) -> Result<Project, ServiceError> {
        ensure_non_blank(title, "project title must not be blank")?;
        self.guarded(token, "create_project", |store| {
            let project = store.create_project(title, record_type)?;
            let subject = Subject::project(
                project.id,
                json!({ "title": project.title, "recordType": record_type.as_str() }),
            );
            Ok((project, subject))
        })
    }

    pub fn delete_project(
        &self,
        token: &PresentedToken,
        project_id: ProjectId,
    ) -> Result<(), ServiceError> {
        self.guarded(token, "delete_project", |store| {
            let title = store.get_project(project_id)?.map(|p| p.title);
            store.delete_project(project_id)?;
            Ok(((), Subject::project(project_id, json!({ "title": title }))))
        })
    }

    pub fn add_tag(
        &self,
        token: &PresentedToken,
        project_id: ProjectId,
        tag_name: &str,
    ) -> Result<bool, ServiceError> {
        ensure_non_blank(tag_name, "tag name must not be blank")?;
        self.guarded(token, "add_tag", |store| {
            let added = store.add_project_tag(project_id, tag_name)?;
            let info = json!({ "tag": tag_name, "added": added });
            Ok((added, Subject::project(project_id, info)))
        })
    }

    pub fn remove_tag(
        &self,
        token: &PresentedToken,
        project_id: ProjectId,
        tag_name: &str,
    ) -> Result<TagRemoval, ServiceError> {
        self.guarded(token, "remove_tag", |store| {
            let removal = store.remove_project_tag(project_id, tag_name)?;
            let info = removal_info(json!({ "tag": tag_name }), &removal);
            Ok((removal, Subject::project(project_id, info)))
        })
    }

    pub fn add_tag_value(
        &self,
        token: &PresentedToken,
        project_id: ProjectId,
        tag_name: &str,
        value: &str,
    ) -> Result<bool, ServiceError> {
        ensure_non_blank(value, "tag value must not be blank")?;
        self.guarded(token, "add_tag_value", |store| {
            let added = store.add_project_tag_value(project_id, tag_name, value)?;
            let info = json!({ "tag": tag_name, "value": value, "added": added });
            Ok((added, Subject::project(project_id, info)))
        })
    }

    pub fn remove_tag_value(
        &self,
        token: &PresentedToken,
        project_id: ProjectId,
        tag_name: &str,
        value: &str,
    ) -> Result<TagRemoval, ServiceError> {
        self.guarded(token, "remove_tag_value", |store| {
            let removal = store.remove_project_tag_value(project_id, tag_name, value)?;
            let info = removal_info(json!({ "tag": tag_name, "value": value }), &removal);
            Ok((removal, Subject::project(project_id, info)))
        })
    }

    pub fn insert_record(
        &self,
        token: &PresentedToken,
        project_id: ProjectId,
        input: RecordInput,
    ) -> Result<Record, ServiceError> {
        self.guarded(token, "insert_record", |store| {
            let record = store.insert_record(project_id, input)?;
            let subject = Subject::record(&record, json!({ "input": record.input }));
            Ok((record, subject))
        })
    }

    pub fn update_record(
        &self,
        token: &PresentedToken,
        record_id: RecordId,
        input: RecordInput,
    ) -> Result<Record, ServiceError> {
        self.guarded(token, "update_record", |store| {
            let record = store.update_record_input(record_id, input)?;
            let subject = Subject::record(&record, json!({ "input": record.input }));
            Ok((record, subject))
        })
    }

    pub fn remove_record(
        &self,
        token: &PresentedToken,
        record_id: RecordId,
    ) -> Result<bool, ServiceError> {
        self.guarded(token, "remove_record", |store| {
            let project_id = store.get_record(record_id)?.map(|r| r.project_id);
            let removed = store.remove_record(record_id)?;
            let subject = Subject {
                project_id,
                record_id: Some(record_id),
                info: json!({ "removed": removed }),
            };
            Ok((removed, subject))
        })
    }

    pub fn set_record_tag(
        &self,
        token: &PresentedToken,
        record_id: RecordId,
        tag_name: &str,
        value: &str,
    ) -> Result<Record, ServiceError> {
        self.guarded(token, "set_record_tag", |store| {
            store.set_record_tag(record_id, tag_name, value)?;
            let record = store.get_record(record_id)?.ok_or(StoreError::UnknownId)?;
            let subject = Subject::record(&record, json!({ "tag": tag_name, "value": value }));
            Ok((record, subject))
        })
    }

    pub fn remove_record_tag(
        &self,
        token: &PresentedToken,
        record_id: RecordId,
        tag_name: &str,
    ) -> Result<bool, ServiceError> {
        self.guarded(token, "remove_record_tag", |store| {
            let project_id = store.get_record(record_id)?.map(|r| r.project_id);
            let removed = store.remove_record_tag(record_id, tag_name)?;
            let subject = Subject {
                project_id,
                record_id: Some(record_id),
                info: json!({ "tag": tag_name, "removed": removed }),
            };
            Ok((removed, subject))
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserSummary>, ServiceError> {
        Ok(self.store().list_users()?)
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>, ServiceError> {
        Ok(self.store().list_projects()?)
    }

    pub fn get_project(&self, project_id: ProjectId) -> Result<Option<Project>, ServiceError> {
        Ok(self.store().get_project(project_id)?)
    }

    pub fn list_project_records(&self, project_id: ProjectId) -> Result<Vec<Record>, ServiceError> {
        Ok(self.store().list_project_records(project_id)?)
    }

    pub fn get_record(&self, record_id: RecordId) -> Result<Option<Record>, ServiceError> {
        Ok(self.store().get_record(record_id)?)
    }

    pub fn project_status(&self, project_id: ProjectId) -> Result<ProjectStatus, ServiceError> {
        Ok(self.store().project_status(project_id)?)
    }

    pub fn events(
        &self,
        filter: Option<EventFilter>,
        order: SortOrder,
    ) -> Result<Vec<Event>, ServiceError> {
        let store = self.store();
        let events = match filter {
            Some(filter) => store.events_by(filter, order)?,
            None => store.list_events(order)?,
        };
        Ok(events)
    }
}

/// What an event is about.
struct Subject {
    project_id: Option<ProjectId>,
    record_id: Option<RecordId>,
    info: Value,
}

impl Subject {
    fn project(project_id: ProjectId, info: Value) -> Self {
        Self {
            project_id: Some(project_id),
            record_id: None,
            info,
        }
    }

    fn record(record: &Record, info: Value) -> Self {
        Self {
            project_id: Some(record.project_id),
            record_id: Some(record.id),
            info,
        }
    }
}

fn removal_info(mut info: Value, removal: &TagRemoval) -> Value {
    if let Some(map) = info.as_object_mut() {
        map.insert("removed".into(), json!(removal.vocabulary_changed));
        map.insert("recordsUpdated".into(), json!(removal.records_updated));
    }
    info
}

fn ensure_non_blank(value: &str, message: &'static str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::InvalidInput(message));
    }
    Ok(())
}
