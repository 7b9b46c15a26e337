use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::ValidationError, profiles::ProfileId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Dimension,
    Cube,
    Process,
}

impl ObjectType {
    pub const ALL: [ObjectType; 3] = [ObjectType::Dimension, ObjectType::Cube, ObjectType::Process];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Dimension => "dimension",
            ObjectType::Cube => "cube",
            ObjectType::Process => "process",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ObjectType::Dimension => "Dimensions",
            ObjectType::Cube => "Cubes",
            ObjectType::Process => "Processes",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dimension" | "dimensions" | "dim" => Ok(ObjectType::Dimension),
            "cube" | "cubes" => Ok(ObjectType::Cube),
            "process" | "processes" | "proc" => Ok(ObjectType::Process),
            _ => Err(ValidationError::UnknownObjectType(value.to_string())),
        }
    }
}

/// A named, typed object as exchanged with the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
}

impl ObjectRef {
    pub fn new(object_type: ObjectType, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object_type,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.object_type, self.name)
    }
}

/// An entry of the working object set. `selected` never leaves the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigratableObject {
    pub name: String,
    pub object_type: ObjectType,
    pub selected: bool,
}

impl MigratableObject {
    pub fn unselected(object: ObjectRef) -> Self {
        Self {
            name: object.name,
            object_type: object.object_type,
            selected: false,
        }
    }

    pub fn is(&self, object_type: ObjectType, name: &str) -> bool {
        self.object_type == object_type && self.name == name
    }

    pub fn to_ref(&self) -> ObjectRef {
        ObjectRef::new(self.object_type, self.name.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationRequest {
    pub source: ProfileId,
    pub target: ProfileId,
    pub objects: Vec<ObjectRef>,
}

/// Per-object entry of a migration reply. Servers may omit `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectResult {
    pub name: String,
    pub status: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<ObjectType>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectStatus {
    Reported(String),
    /// The backend returned no entry for this object.
    Unknown,
}

impl ObjectStatus {
    pub fn is_success(&self) -> bool {
        match self {
            ObjectStatus::Reported(status) => matches!(
                status.trim().to_ascii_lowercase().as_str(),
                "ok" | "success" | "succeeded" | "migrated" | "transferred" | "done"
            ),
            ObjectStatus::Unknown => false,
        }
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectStatus::Reported(status) => f.write_str(status),
            ObjectStatus::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectOutcome {
    pub object: ObjectRef,
    pub status: ObjectStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub success: bool,
    pub message: String,
    pub results: Vec<ObjectOutcome>,
}

impl MigrationOutcome {
    /// Pairs every requested object with at most one reported result.
    ///
    /// Results are matched by name, and by type when the backend sent one.
    /// Reported entries that match nothing are dropped; requested objects
    /// without an entry get [`ObjectStatus::Unknown`].
    pub fn reconcile(
        requested: &[ObjectRef],
        success: bool,
        message: String,
        reported: Vec<ObjectResult>,
    ) -> Self {
        let mut remaining: Vec<Option<ObjectResult>> = reported.into_iter().map(Some).collect();
        let results = requested
            .iter()
            .map(|object| {
                let slot = remaining.iter_mut().find(|slot| {
                    slot.as_ref().is_some_and(|result| {
                        result.name == object.name
                            && result
                                .object_type
                                .is_none_or(|object_type| object_type == object.object_type)
                    })
                });
                let status = match slot.and_then(Option::take) {
                    Some(result) => ObjectStatus::Reported(result.status),
                    None => ObjectStatus::Unknown,
                };
                ObjectOutcome {
                    object: object.clone(),
                    status,
                }
            })
            .collect();
        Self {
            success,
            message,
            results,
        }
    }

    /// Outcome for a migration whose reply never arrived.
    pub fn unreachable(requested: &[ObjectRef], message: String) -> Self {
        Self::reconcile(requested, false, message, Vec::new())
    }

    pub fn unknown_count(&self) -> usize {
        self.results
            .iter()
            .filter(|outcome| outcome.status == ObjectStatus::Unknown)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reported(name: &str, status: &str, object_type: Option<ObjectType>) -> ObjectResult {
        ObjectResult {
            name: name.into(),
            status: status.into(),
            object_type,
        }
    }

    #[test]
    fn missing_results_are_unknown() {
        let requested = vec![
            ObjectRef::new(ObjectType::Dimension, "Region"),
            ObjectRef::new(ObjectType::Cube, "Sales"),
        ];
        let outcome = MigrationOutcome::reconcile(
            &requested,
            true,
            "Migrated 1 objects successfully".into(),
            vec![reported("Region", "ok", None)],
        );
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].status, ObjectStatus::Reported("ok".into()));
        assert_eq!(outcome.results[1].status, ObjectStatus::Unknown);
        assert_eq!(outcome.unknown_count(), 1);
    }

    #[test]
    fn same_name_across_types_matches_by_type() {
        let requested = vec![
            ObjectRef::new(ObjectType::Dimension, "Sales"),
            ObjectRef::new(ObjectType::Cube, "Sales"),
        ];
        let outcome = MigrationOutcome::reconcile(
            &requested,
            false,
            "partial".into(),
            vec![
                reported("Sales", "failed", Some(ObjectType::Cube)),
                reported("Sales", "ok", Some(ObjectType::Dimension)),
            ],
        );
        assert_eq!(outcome.results[0].status, ObjectStatus::Reported("ok".into()));
        assert_eq!(outcome.results[1].status, ObjectStatus::Reported("failed".into()));
    }

    #[test]
    fn untyped_results_are_consumed_once() {
        let requested = vec![
            ObjectRef::new(ObjectType::Dimension, "Sales"),
            ObjectRef::new(ObjectType::Cube, "Sales"),
        ];
        let outcome = MigrationOutcome::reconcile(
            &requested,
            true,
            String::new(),
            vec![reported("Sales", "ok", None), reported("Ghost", "ok", None)],
        );
        assert_eq!(outcome.results[0].status, ObjectStatus::Reported("ok".into()));
        assert_eq!(outcome.results[1].status, ObjectStatus::Unknown);
    }

    #[test]
    fn unreachable_marks_everything_unknown() {
        let requested = vec![ObjectRef::new(ObjectType::Process, "load.actuals")];
        let outcome = MigrationOutcome::unreachable(&requested, "request failed".into());
        assert!(!outcome.success);
        assert_eq!(outcome.unknown_count(), 1);
    }

    #[test]
    fn status_classification() {
        assert!(ObjectStatus::Reported("OK".into()).is_success());
        assert!(!ObjectStatus::Reported("not transferred".into()).is_success());
        assert!(!ObjectStatus::Unknown.is_success());
    }

    #[test]
    fn object_types_parse_from_common_spellings() {
        assert_eq!("Cubes".parse::<ObjectType>().unwrap(), ObjectType::Cube);
        assert_eq!("dim".parse::<ObjectType>().unwrap(), ObjectType::Dimension);
        assert!("view".parse::<ObjectType>().is_err());
    }
}
