use thiserror::Error;

use crate::{
    objects::ObjectType,
    profiles::{ProfileId, ProfileKind},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Message used when a failed request carries no explanation of its own.
pub const REQUEST_FAILED: &str = "request failed";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Transport failure, timeout, non-2xx status or malformed body.
    #[error("{0}")]
    BackendUnavailable(String),
    /// The backend answered with `success: false`.
    #[error("{0}")]
    BackendRejected(String),
}

impl Error {
    pub fn unavailable(message: Option<String>) -> Self {
        Self::BackendUnavailable(non_empty(message).unwrap_or_else(|| REQUEST_FAILED.into()))
    }

    pub fn rejected(message: Option<String>, fallback: &str) -> Self {
        Self::BackendRejected(non_empty(message).unwrap_or_else(|| fallback.into()))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

fn non_empty(message: Option<String>) -> Option<String> {
    message
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("display name must not be empty")]
    EmptyDisplayName,
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("{kind} profile is missing required field `{field}`")]
    MissingField {
        kind: ProfileKind,
        field: &'static str,
    },
    #[error("field `{field}` must not be empty")]
    EmptyField { field: &'static str },
    #[error("field `{field}` is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("field `{field}` does not belong to a {kind} profile")]
    ForeignField { kind: ProfileKind, field: String },
    #[error("port must be between 1 and 65535, got {0}")]
    PortOutOfRange(i64),
    #[error("unknown profile type `{0}`")]
    UnknownKind(String),
    #[error("unknown object type `{0}`")]
    UnknownObjectType(String),
    #[error("a {existing} profile cannot be changed into a {requested} profile")]
    KindMismatch {
        existing: ProfileKind,
        requested: ProfileKind,
    },
    #[error("profile {0} does not exist")]
    UnknownProfile(ProfileId),
    #[error("{object_type} `{name}` is not in the object list")]
    UnknownObject {
        object_type: ObjectType,
        name: String,
    },
    #[error("migration blocked: {0}")]
    MigrationBlocked(MigrationBlocker),
    #[error("cannot {operation} while the workflow is {state}")]
    NotAllowed {
        operation: &'static str,
        state: &'static str,
    },
}

/// The first unmet migration precondition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MigrationBlocker {
    #[error("no source environment selected")]
    SourceMissing,
    #[error("no target environment selected")]
    TargetMissing,
    #[error("source and target must be different environments")]
    SameEnvironment,
    #[error("no objects selected")]
    NothingSelected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_falls_back_to_generic_message() {
        let err = Error::unavailable(None);
        assert_eq!(err.to_string(), REQUEST_FAILED);

        let err = Error::unavailable(Some("   ".into()));
        assert_eq!(err.to_string(), REQUEST_FAILED);

        let err = Error::unavailable(Some("Invalid credentials".into()));
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[test]
    fn validation_errors_convert() {
        let err: Error = ValidationError::EmptyDisplayName.into();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "display name must not be empty");
    }
}
