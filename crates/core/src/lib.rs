#![forbid(unsafe_code)]

pub mod clock;
pub mod model;
pub mod token;

pub use model::*;

pub mod ids {
    use serde::{Deserialize, Serialize};

    macro_rules! define_id {
        ($name:ident) => {
            #[derive(
                Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(i64);

            impl $name {
                pub fn new(value: i64) -> Self {
                    Self(value)
                }

                pub fn get(self) -> i64 {
                    self.0
                }

                pub fn parse(value: &str) -> Result<Self, IdError> {
                    parse_id(value).map(Self)
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        };
    }

    define_id!(UserId);
    define_id!(ProjectId);
    define_id!(RecordId);
    define_id!(EventId);

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum IdError {
        Empty,
        NotANumber,
        NotPositive,
    }

    impl IdError {
        pub fn message(&self) -> &'static str {
            match self {
                Self::Empty => "id must not be empty",
                Self::NotANumber => "id must be an integer",
                Self::NotPositive => "id must be positive",
            }
        }
    }

    fn parse_id(value: &str) -> Result<i64, IdError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(IdError::Empty);
        }
        let parsed = value.parse::<i64>().map_err(|_| IdError::NotANumber)?;
        if parsed <= 0 {
            return Err(IdError::NotPositive);
        }
        Ok(parsed)
    }
}

pub mod error {
    /// Failure categories shared by every layer; transports map these to status codes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub enum ErrorKind {
        InvalidArgument,
        Conflict,
        NotFound,
        Unauthorized,
        IoError,
    }

    impl ErrorKind {
        pub fn code(self) -> &'static str {
            match self {
                Self::InvalidArgument => "INVALID_ARGUMENT",
                Self::Conflict => "CONFLICT",
                Self::NotFound => "NOT_FOUND",
                Self::Unauthorized => "UNAUTHORIZED",
                Self::IoError => "IO_ERROR",
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ids::{IdError, ProjectId, RecordId};

    #[test]
    fn id_parsing_rejects_garbage() {
        assert_eq!(ProjectId::parse("").unwrap_err(), IdError::Empty);
        assert_eq!(ProjectId::parse("  ").unwrap_err(), IdError::Empty);
        assert_eq!(ProjectId::parse("abc").unwrap_err(), IdError::NotANumber);
        assert_eq!(ProjectId::parse("0").unwrap_err(), IdError::NotPositive);
        assert_eq!(RecordId::parse("-4").unwrap_err(), IdError::NotPositive);
        assert_eq!(RecordId::parse(" 42 ").unwrap().get(), 42);
    }

    #[test]
    fn ids_serialize_as_bare_integers() {
        let id = ProjectId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        assert_eq!(id.to_string(), "7");
    }
}
