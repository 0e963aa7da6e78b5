//! Error types for the openquery crate.
//!
//! Parse-time problems are reported per query parameter and gathered into a
//! [`BadRequest`] so a client sees every problem in one round trip.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

/// Boxed error returned by data sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur when parsing query options, running the pipeline or
/// patching a record.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Malformed expression syntax.
    #[error("syntax error at position {position}: {reason}")]
    Parse { position: usize, reason: String },

    /// A field or relation path does not exist on the record type.
    #[error("unknown field '{name}'")]
    UnknownField { name: String },

    /// Operand or value types are incompatible.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Unknown function or operator keyword.
    #[error("unsupported operator '{name}' at position {position}")]
    UnsupportedOperator { name: String, position: usize },

    /// Relation expansion nested deeper than the configured bound.
    #[error("expansion of '{path}' exceeds the maximum depth of {max_depth}")]
    ExpansionTooDeep { path: String, max_depth: usize },

    /// Bad skip/top/count literal or malformed payload.
    #[error("invalid value '{value}': {reason}")]
    InvalidValue { value: String, reason: String },

    /// A patch tried to write the identifier field.
    #[error("field '{name}' is an identifier and cannot be modified")]
    ImmutableField { name: String },

    /// A patch carried a version that no longer matches the stored record.
    #[error("field '{field}' does not match the stored version")]
    Conflict { field: String },

    /// Single-item lookup or patch target matched no record.
    #[error("record not found")]
    NotFound,

    /// Single-item contract matched more than one record.
    #[error("expected at most one record, found {found}")]
    MultipleRecords { found: usize },

    /// Semantic validation of a patched record failed.
    #[error("validation failed: {}", summarize(.0))]
    ValidationFailed(Vec<ValidationError>),

    /// One or more parameters failed to parse.
    #[error(transparent)]
    BadRequest(#[from] BadRequest),

    /// The operation observed its cancellation signal.
    #[error("operation cancelled")]
    Cancelled,

    /// The data source failed.
    #[error("data source error: {0}")]
    Source(#[source] BoxError),
}

impl QueryError {
    /// Create a parse error.
    pub fn parse(position: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            position,
            reason: reason.into(),
        }
    }

    /// Create an unknown field error.
    pub fn unknown_field(name: impl Into<String>) -> Self {
        Self::UnknownField { name: name.into() }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a data source error.
    pub fn from_source(err: impl Into<BoxError>) -> Self {
        Self::Source(err.into())
    }

    /// Stable machine-readable tag for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::UnknownField { .. } => "unknown_field",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UnsupportedOperator { .. } => "unsupported_operator",
            Self::ExpansionTooDeep { .. } => "expansion_too_deep",
            Self::InvalidValue { .. } => "invalid_value",
            Self::ImmutableField { .. } => "immutable_field",
            Self::Conflict { .. } => "conflict",
            Self::NotFound => "not_found",
            Self::MultipleRecords { .. } => "multiple_records",
            Self::ValidationFailed(_) => "validation_failed",
            Self::BadRequest(_) => "bad_request",
            Self::Cancelled => "cancelled",
            Self::Source(_) => "source",
        }
    }

    /// Returns `true` if the error was caused by the request rather than by
    /// the data source or a cancellation.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::Source(_))
    }
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A semantic validation failure reported by the host after a patch.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// The error message describing the validation failure.
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// An error bound to the query parameter or payload field it came from.
#[derive(Debug)]
pub struct ParameterError {
    /// Parameter name (`filter`, `orderby`, ...) or patched field name.
    pub parameter: String,
    /// Byte offset of the offending token, when known.
    pub position: Option<usize>,
    /// The underlying error.
    pub error: QueryError,
}

impl ParameterError {
    pub fn new(parameter: impl Into<String>, error: QueryError) -> Self {
        Self {
            parameter: parameter.into(),
            position: None,
            error,
        }
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

impl std::fmt::Display for ParameterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.parameter, self.error)
    }
}

impl Serialize for ParameterError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.position.is_some() { 4 } else { 3 };
        let mut state = serializer.serialize_struct("ParameterError", len)?;
        state.serialize_field("parameter", &self.parameter)?;
        state.serialize_field("kind", self.error.kind())?;
        state.serialize_field("message", &self.error.to_string())?;
        if let Some(position) = self.position {
            state.serialize_field("position", &position)?;
        }
        state.end()
    }
}

/// Every parameter error found during one parse pass.
#[derive(Debug, Default, Error, serde::Serialize)]
#[error("invalid request: {}", join_errors(.errors))]
pub struct BadRequest {
    errors: Vec<ParameterError>,
}

impl BadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ParameterError) {
        self.errors.push(error);
    }

    /// Appends every error from `other`.
    pub fn extend(&mut self, other: BadRequest) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ParameterError] {
        &self.errors
    }

    /// Returns the first error reported for `parameter`.
    pub fn for_parameter(&self, parameter: &str) -> Option<&QueryError> {
        self.errors
            .iter()
            .find(|e| e.parameter == parameter)
            .map(|e| &e.error)
    }

    /// Converts to `Err(self)` if any error was collected.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ParameterError> for BadRequest {
    fn from(error: ParameterError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl From<Vec<ParameterError>> for BadRequest {
    fn from(errors: Vec<ParameterError>) -> Self {
        Self { errors }
    }
}

fn join_errors(errors: &[ParameterError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for openquery operations.
pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(QueryError::unknown_field("x").kind(), "unknown_field");
        assert_eq!(QueryError::NotFound.kind(), "not_found");
        assert_eq!(QueryError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn client_errors() {
        assert!(QueryError::invalid_value("-1", "negative").is_client_error());
        assert!(!QueryError::Cancelled.is_client_error());
        assert!(!QueryError::from_source("boom").is_client_error());
    }

    #[test]
    fn bad_request_collects_and_serializes() {
        let mut bad = BadRequest::new();
        bad.push(ParameterError::new("filter", QueryError::unknown_field("agee")).at(0));
        bad.push(ParameterError::new(
            "top",
            QueryError::invalid_value("x", "not a non-negative integer"),
        ));

        assert_eq!(bad.errors().len(), 2);
        assert!(matches!(
            bad.for_parameter("filter"),
            Some(QueryError::UnknownField { name }) if name == "agee"
        ));

        let json = serde_json::to_value(&bad).unwrap();
        assert_eq!(json["errors"][0]["parameter"], "filter");
        assert_eq!(json["errors"][0]["kind"], "unknown_field");
        assert_eq!(json["errors"][0]["position"], 0);
        assert_eq!(json["errors"][1]["kind"], "invalid_value");
        assert!(json["errors"][1].get("position").is_none());
    }

    #[test]
    fn validation_failed_display() {
        let err = QueryError::ValidationFailed(vec![
            ValidationError::new("name", "required"),
            ValidationError::new("age", "too large"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: name: required; age: too large"
        );
    }
}
