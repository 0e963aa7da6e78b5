//! Sparse partial updates.
//!
//! A [`Delta`] holds only the fields a patch payload mentions. A field that
//! is present with `null` is recorded as [`Literal::Null`]; a field that is
//! absent is not recorded at all and is never touched on the target.
//!
//! Every value is type-checked against the record metadata when the delta is
//! built, so applying it can only fail on a version conflict.
//!
//! If the record type declares a version field and the payload carries it,
//! [`Delta::apply`] compares it with the loaded record and fails with
//! [`QueryError::Conflict`] when they differ. The version field itself is
//! never written by a patch.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde_json::{Map, Value as Json};

use crate::error::{BadRequest, ParameterError, QueryError, Result, ValidationError};
use crate::metadata::{FieldMeta, RecordMetadata};
use crate::options::compare_values;
use crate::record::Record;
use crate::value::{FieldType, Literal, Number, Timestamp};

/// Parameter name used for errors about the payload as a whole.
pub const PAYLOAD: &str = "body";

/// Field changes for one patch request on records of type `T`.
pub struct Delta<T> {
    changes: BTreeMap<&'static str, Literal>,
    expected_version: Option<Literal>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Delta<T> {
    pub fn new() -> Self {
        Self {
            changes: BTreeMap::new(),
            expected_version: None,
            _record: PhantomData,
        }
    }

    /// Marks `field` as set to `value`.
    pub fn set(mut self, field: &str, value: impl Into<Literal>) -> Result<Self> {
        self.insert(field, value.into())?;
        Ok(self)
    }

    /// Builds a delta from a JSON payload, which must be an object.
    pub fn from_json(payload: &Json) -> std::result::Result<Self, BadRequest> {
        match payload {
            Json::Object(map) => Self::from_map(map),
            other => Err(ParameterError::new(
                PAYLOAD,
                QueryError::invalid_value(json_type(other), "expected a JSON object"),
            )
            .into()),
        }
    }

    /// Builds a delta from a JSON object, reporting every bad field at once.
    pub fn from_map(map: &Map<String, Json>) -> std::result::Result<Self, BadRequest> {
        let meta = T::metadata();
        let mut delta = Self::new();
        let mut errors = BadRequest::new();
        for (name, value) in map {
            let converted = match meta.field(name) {
                Some(field) => from_json(field, value),
                None => Err(QueryError::unknown_field(name.as_str())),
            };
            if let Err(error) = converted.and_then(|literal| delta.insert(name, literal)) {
                errors.push(ParameterError::new(name.as_str(), error));
            }
        }
        if !errors.is_empty() {
            tracing::warn!(record = meta.name(), "rejected patch payload: {errors}");
        }
        errors.into_result()?;
        Ok(delta)
    }

    fn insert(&mut self, name: &str, literal: Literal) -> Result<()> {
        let field = writable(T::metadata(), name)?;
        field.check(&literal)?;
        if field.is_version() {
            self.expected_version = Some(literal);
        } else {
            self.changes.insert(field.name(), literal);
        }
        Ok(())
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Names of the fields this delta writes, in name order.
    pub fn changed_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.changes.keys().copied()
    }

    /// `true` if the payload mentioned `field`, even with `null`.
    pub fn is_set(&self, field: &str) -> bool {
        self.changes.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Literal> {
        self.changes.get(field)
    }

    /// The version the payload expects the stored record to have.
    pub fn expected_version(&self) -> Option<&Literal> {
        self.expected_version.as_ref()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    // ========================================================================
    // Application
    // ========================================================================

    /// Writes the set fields onto `target` in declaration order and returns
    /// their names.
    pub fn apply(mut self, target: &mut T) -> Result<Vec<&'static str>> {
        let meta = T::metadata();
        self.check_version(meta, target)?;

        let mut written = Vec::with_capacity(self.changes.len());
        for field in meta.fields() {
            if let Some(value) = self.changes.remove(field.name()) {
                target.set_field(field.name(), value)?;
                written.push(field.name());
            }
        }
        tracing::debug!(record = meta.name(), fields = ?written, "applied patch");
        Ok(written)
    }

    /// Pure form of [`apply`](Self::apply).
    pub fn patched(self, mut target: T) -> Result<T> {
        self.apply(&mut target)?;
        Ok(target)
    }

    fn check_version(&self, meta: &RecordMetadata, target: &T) -> Result<()> {
        let (Some(expected), Some(field)) = (&self.expected_version, meta.version()) else {
            return Ok(());
        };
        let stored = target.field_value(field.name());
        let expected = expected.as_value();
        let same = match (stored.is_null(), expected.is_null()) {
            (true, true) => true,
            (false, false) => compare_values(&stored, &expected) == Some(Ordering::Equal),
            _ => false,
        };
        if same {
            return Ok(());
        }
        tracing::warn!(
            record = meta.name(),
            field = field.name(),
            "patch rejected: version mismatch"
        );
        Err(QueryError::Conflict {
            field: field.name().to_string(),
        })
    }
}

impl<T: Record> Default for Delta<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Delta<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delta")
            .field("changes", &self.changes)
            .field("expected_version", &self.expected_version)
            .finish()
    }
}

/// Loads, patches and validates one record.
///
/// `loaded` is what the source returned for the target identifier. Missing
/// records fail with [`QueryError::NotFound`]; a failed `validate` callback
/// fails with [`QueryError::ValidationFailed`]. The returned record is ready
/// to be committed.
pub fn patch_record<T, V>(loaded: Option<T>, delta: Delta<T>, validate: V) -> Result<T>
where
    T: Record,
    V: FnOnce(&T) -> std::result::Result<(), Vec<ValidationError>>,
{
    let target = loaded.ok_or(QueryError::NotFound)?;
    let patched = delta.patched(target)?;
    validate(&patched).map_err(|errors| {
        tracing::warn!(
            record = T::metadata().name(),
            errors = errors.len(),
            "patched record failed validation"
        );
        QueryError::ValidationFailed(errors)
    })?;
    Ok(patched)
}

fn writable<'m>(meta: &'m RecordMetadata, name: &str) -> Result<&'m FieldMeta> {
    let field = meta
        .field(name)
        .ok_or_else(|| QueryError::unknown_field(name))?;
    if field.relation().is_some() {
        return Err(QueryError::type_mismatch("scalar field", "relation"));
    }
    if field.is_key() {
        return Err(QueryError::ImmutableField {
            name: field.name().to_string(),
        });
    }
    Ok(field)
}

/// Converts a JSON value into a literal of the field's type.
fn from_json(field: &FieldMeta, value: &Json) -> Result<Literal> {
    let mismatch = |expected: &str| QueryError::type_mismatch(expected, json_type(value));
    let Some(ty) = field.field_type() else {
        return Err(mismatch("scalar field"));
    };
    match (ty, value) {
        (_, Json::Null) => Ok(Literal::Null),
        (FieldType::String, Json::String(s)) => Ok(Literal::String(s.clone())),
        (FieldType::Bool, Json::Bool(b)) => Ok(Literal::Bool(*b)),
        (FieldType::Number, Json::Number(n)) => {
            let number = if let Some(i) = n.as_i64() {
                Number::I64(i)
            } else if let Some(u) = n.as_u64() {
                Number::U64(u)
            } else {
                Number::F64(n.as_f64().ok_or_else(|| mismatch("number"))?)
            };
            Ok(Literal::Number(number))
        }
        (FieldType::Timestamp, Json::String(s)) => Timestamp::parse(s)
            .map(Literal::Timestamp)
            .ok_or_else(|| QueryError::type_mismatch(FieldType::Timestamp.as_str(), "string")),
        (ty, _) => Err(mismatch(ty.as_str())),
    }
}

fn json_type(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
