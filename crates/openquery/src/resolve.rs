//! Field path resolution.
//!
//! Every option parser turns textual paths like `manager.name` into a
//! [`FieldPath`] by walking the record metadata. A path that does not resolve
//! is reported with the full offending text.

use std::fmt;

use crate::error::{QueryError, Result};
use crate::metadata::{FieldMeta, RecordMetadata};
use crate::record::{Record, Related};
use crate::value::{FieldType, Value};

/// A resolved, dot-separated path through single-valued relations.
#[derive(Debug, Clone)]
pub struct FieldPath {
    segments: Vec<&'static FieldMeta>,
}

impl FieldPath {
    /// The field at the end of the path.
    pub fn leaf(&self) -> &'static FieldMeta {
        // Resolution never produces an empty path.
        self.segments[self.segments.len() - 1]
    }

    /// All segments, relations first.
    pub fn segments(&self) -> &[&'static FieldMeta] {
        &self.segments
    }

    /// Scalar type of the leaf.
    pub fn field_type(&self) -> Option<FieldType> {
        self.leaf().field_type()
    }

    /// `true` if reading the path may yield `null`.
    pub fn is_nullable(&self) -> bool {
        self.segments.iter().any(|f| f.is_nullable())
    }

    /// Reads the leaf value from `record`, following relations.
    ///
    /// An unset relation anywhere along the path reads as [`Value::Null`].
    pub fn read<'a>(&self, record: &'a dyn Record) -> Value<'a> {
        let (leaf, relations) = match self.segments.split_last() {
            Some(split) => split,
            None => return Value::Null,
        };
        let mut current = record;
        for relation in relations {
            match current.related(relation.name()) {
                Related::One(Some(next)) => current = next,
                _ => return Value::Null,
            }
        }
        current.field_value(leaf.name())
    }
}

impl PartialEq for FieldPath {
    fn eq(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| std::ptr::eq(*a, *b))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment.name())?;
        }
        Ok(())
    }
}

/// Resolves `path` against `meta`.
///
/// Intermediate segments must be single-valued relations. The leaf may be a
/// scalar or a relation.
pub fn resolve_path(meta: &'static RecordMetadata, path: &str) -> Result<FieldPath> {
    let mut segments = Vec::new();
    let mut current = meta;
    let mut parts = path.split('.').peekable();

    while let Some(part) = parts.next() {
        let field = current
            .field(part)
            .ok_or_else(|| QueryError::unknown_field(path))?;
        segments.push(field);

        if parts.peek().is_none() {
            break;
        }
        match field.relation() {
            Some(rel) if rel.is_many() => {
                return Err(QueryError::type_mismatch(
                    format!("single-valued relation at '{}'", field.name()),
                    "collection",
                ));
            }
            Some(rel) => current = rel.target(),
            None => return Err(QueryError::unknown_field(path)),
        }
    }

    Ok(FieldPath { segments })
}

/// Resolves `path` and requires the leaf to be a scalar field.
pub fn resolve_scalar(meta: &'static RecordMetadata, path: &str) -> Result<FieldPath> {
    let resolved = resolve_path(meta, path)?;
    if resolved.field_type().is_none() {
        return Err(QueryError::type_mismatch(
            format!("scalar field at '{path}'"),
            "relation",
        ));
    }
    Ok(resolved)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::error::{QueryError, Result};
    use crate::metadata::{cached, RecordMetadata};
    use crate::record::{Record, Related};
    use crate::scalar::{RelationField, Scalar};
    use crate::value::{Literal, Value};

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Person {
        pub id: u32,
        pub name: String,
        pub age: Option<i32>,
        pub manager: Option<Box<Person>>,
        pub reports: Vec<Person>,
    }

    impl Person {
        pub fn new(id: u32, name: &str, age: i32) -> Self {
            Person {
                id,
                name: name.to_string(),
                age: Some(age),
                ..Default::default()
            }
        }
    }

    impl Record for Person {
        fn metadata() -> &'static RecordMetadata {
            cached::<Self>(|| {
                RecordMetadata::builder("Person")
                    .key::<u32>("id")
                    .scalar::<String>("name")
                    .scalar::<Option<i32>>("age")
                    .relation::<Option<Box<Person>>>("manager")
                    .relation::<Vec<Person>>("reports")
                    .build()
            })
        }

        fn record_metadata(&self) -> &'static RecordMetadata {
            Self::metadata()
        }

        fn field_value(&self, field: &str) -> Value<'_> {
            match field {
                "id" => self.id.as_value(),
                "name" => self.name.as_value(),
                "age" => self.age.as_value(),
                _ => Value::Null,
            }
        }

        fn related(&self, relation: &str) -> Related<'_> {
            match relation {
                "manager" => self.manager.related(),
                "reports" => self.reports.related(),
                _ => Related::Unknown,
            }
        }

        fn set_field(&mut self, field: &str, value: Literal) -> Result<()> {
            match field {
                "id" => self.id = Scalar::from_literal(value)?,
                "name" => self.name = Scalar::from_literal(value)?,
                "age" => self.age = Scalar::from_literal(value)?,
                _ => return Err(QueryError::unknown_field(field)),
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::Person;
    use super::*;
    use crate::value::Number;

    fn meta() -> &'static RecordMetadata {
        Person::metadata()
    }

    #[test]
    fn resolves_plain_and_nested_paths() {
        let path = resolve_path(meta(), "name").unwrap();
        assert_eq!(path.to_string(), "name");
        assert_eq!(path.field_type(), Some(FieldType::String));

        let nested = resolve_scalar(meta(), "manager.manager.age").unwrap();
        assert_eq!(nested.segments().len(), 3);
        assert_eq!(nested.to_string(), "manager.manager.age");
        assert!(nested.is_nullable());
    }

    #[test]
    fn unknown_segment_reports_full_path() {
        let err = resolve_path(meta(), "manager.salary").unwrap_err();
        assert!(matches!(err, QueryError::UnknownField { name } if name == "manager.salary"));

        let err = resolve_path(meta(), "name.first").unwrap_err();
        assert!(matches!(err, QueryError::UnknownField { name } if name == "name.first"));

        assert!(resolve_path(meta(), "").is_err());
    }

    #[test]
    fn collections_cannot_be_traversed() {
        let err = resolve_path(meta(), "reports.name").unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { .. }));
    }

    #[test]
    fn scalar_resolution_rejects_relations() {
        assert!(resolve_path(meta(), "manager").is_ok());
        assert!(matches!(
            resolve_scalar(meta(), "manager"),
            Err(QueryError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn read_follows_relations() {
        let mut alice = Person::new(1, "Alice", 30);
        alice.manager = Some(Box::new(Person::new(2, "Bob", 50)));

        let path = resolve_scalar(meta(), "manager.age").unwrap();
        assert_eq!(path.read(&alice), Value::Number(Number::I64(50)));

        let orphan = Person::new(3, "Carol", 20);
        assert_eq!(path.read(&orphan), Value::Null);
    }
}
