//! Spec-level error reporting.
//!
//! All user-facing failures during query compilation are `SpecError`s
//! carrying the query name and a human-readable path into the query spec
//! tree. A spec error is fatal to the query being compiled but not to the
//! process; internal invariant violations panic instead.

use thiserror::Error;

/// Identifies the part of a query spec a diagnostic refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecLocation {
    pub query_name: String,
    pub query_part: Option<String>,
}

impl SpecLocation {
    pub fn new(query_name: &str) -> Self {
        SpecLocation {
            query_name: query_name.to_string(),
            query_part: None,
        }
    }

    /// Return a location extended with a further path segment, e.g.
    /// "child collection 'compoundsEntered'".
    pub fn with_part(&self, part: &str) -> Self {
        let query_part = match &self.query_part {
            None => part.to_string(),
            Some(existing) => format!("{existing} / {part}"),
        };
        SpecLocation {
            query_name: self.query_name.clone(),
            query_part: Some(query_part),
        }
    }
}

/// Category of a query spec failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecErrorKind {
    TableNotFound,
    FieldNotFound,
    NoForeignKey,
    AmbiguousForeignKey,
    UnknownJoinField,
    InvalidFieldSpec,
    InvalidUnwrap,
}

/// A diagnosed problem in a query specification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("error in query '{}'{}: {problem}",
    location.query_name,
    location.query_part.as_ref().map(|p| format!(" at '{p}'")).unwrap_or_default())]
pub struct SpecError {
    pub location: SpecLocation,
    pub kind: SpecErrorKind,
    pub problem: String,
}

impl SpecError {
    pub fn new(location: &SpecLocation, kind: SpecErrorKind, problem: impl Into<String>) -> Self {
        SpecError {
            location: location.clone(),
            kind,
            problem: problem.into(),
        }
    }
}

pub type SpecResult<T> = Result<T, SpecError>;
