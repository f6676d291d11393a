#![forbid(unsafe_code)]

use soi_core::error::ErrorKind;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Blob(std::io::Error),
    Sql(rusqlite::Error),
    Json(serde_json::Error),
    InvalidInput(&'static str),
    Conflict(&'static str),
    UnknownId,
    UnknownUser,
    WrongPassword,
    ResetRequired(&'static str),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Blob(_) => ErrorKind::IoError,
            Self::Sql(_) | Self::Json(_) | Self::ResetRequired(_) => ErrorKind::IoError,
            Self::InvalidInput(_) => ErrorKind::InvalidArgument,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::UnknownId | Self::UnknownUser => ErrorKind::NotFound,
            Self::WrongPassword => ErrorKind::Unauthorized,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::ResetRequired(_) => "RESET_REQUIRED",
            Self::WrongPassword => "WRONG_PASSWORD",
            Self::UnknownUser => "UNKNOWN_USER",
            other => other.kind().code(),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Blob(err) => write!(f, "blob store: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::Json(err) => write!(f, "json: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::UnknownId => write!(f, "unknown id"),
            Self::UnknownUser => write!(f, "username is not registered"),
            Self::WrongPassword => write!(f, "password is wrong"),
            Self::ResetRequired(message) => write!(f, "reset required: {message}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) | Self::Blob(err) => Some(err),
            Self::Sql(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
