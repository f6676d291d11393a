#![forbid(unsafe_code)]

use crate::ids::{EventId, ProjectId, RecordId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    Text,
    Image,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Text => "Text",
            RecordType::Image => "Image",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RecordTypeError> {
        match value {
            "Text" => Ok(RecordType::Text),
            "Image" => Ok(RecordType::Image),
            _ => Err(RecordTypeError),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordTypeError;

impl RecordTypeError {
    pub fn message(&self) -> &'static str {
        "record type must be Text or Image"
    }
}

/// A tag name together with its permitted values, in insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub values: Vec<String>,
}

impl Tag {
    pub fn has_value(&self, value: &str) -> bool {
        self.values.iter().any(|candidate| candidate == value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    #[serde(rename = "recordType")]
    pub record_type: RecordType,
    pub tags: Vec<Tag>,
}

impl Project {
    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|tag| tag.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTag {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub project_id: ProjectId,
    #[serde(rename = "recordType")]
    pub record_type: RecordType,
    /// Text value, or the blob reference for image records.
    pub input: String,
    pub tags: Vec<RecordTag>,
}

impl Record {
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.name == name)
            .map(|tag| tag.value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordInput {
    Text(String),
    Image { mime_type: String, bytes: Vec<u8> },
}

impl RecordInput {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordInput::Text(_) => RecordType::Text,
            RecordInput::Image { .. } => RecordType::Image,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    // Stored and compared as plaintext.
    pub password: String,
    pub token_hash: Option<String>,
    pub token_issued_at_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub user_id: UserId,
    pub project_id: Option<ProjectId>,
    pub record_id: Option<RecordId>,
    pub action: String,
    pub info: Value,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewEvent {
    pub user_id: UserId,
    pub project_id: Option<ProjectId>,
    pub record_id: Option<RecordId>,
    pub action: String,
    pub info: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventFilter {
    User(UserId),
    Project(ProjectId),
    Record(RecordId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUsage {
    pub count: usize,
    pub values: BTreeMap<String, usize>,
}

/// Per-project tagging progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub title: String,
    pub records: usize,
    #[serde(rename = "taggedRecords")]
    pub tagged_records: usize,
    pub tags: BTreeMap<String, TagUsage>,
}

impl ProjectStatus {
    pub fn tally(project: &Project, records: &[Record]) -> Self {
        let mut tags = BTreeMap::new();
        for tag in &project.tags {
            let usage = TagUsage {
                count: 0,
                values: tag.values.iter().map(|value| (value.clone(), 0)).collect(),
            };
            tags.insert(tag.name.clone(), usage);
        }

        let mut tagged_records = 0;
        for record in records {
            if record.tags.is_empty() {
                continue;
            }
            tagged_records += 1;
            for tag in &record.tags {
                let usage: &mut TagUsage = tags.entry(tag.name.clone()).or_default();
                usage.count += 1;
                *usage.values.entry(tag.value.clone()).or_insert(0) += 1;
            }
        }

        Self {
            title: project.title.clone(),
            records: records.len(),
            tagged_records,
            tags,
        }
    }
}
