//! The record capability set.
//!
//! [`Record`] is implemented by `#[derive(Record)]` (or by hand) for every
//! type exposed through a query endpoint. It gives the engine read access to
//! scalar fields and relations by name, and write access for patches.
//!
//! # Manual Implementation
//!
//! ```
//! use openquery::{Literal, Record, RecordMetadata, Related, Result, Scalar, Value};
//! use openquery::metadata::cached;
//!
//! struct Task {
//!     id: u32,
//!     name: String,
//! }
//!
//! impl Record for Task {
//!     fn metadata() -> &'static RecordMetadata {
//!         cached::<Self>(|| {
//!             RecordMetadata::builder("Task")
//!                 .key::<u32>("id")
//!                 .scalar::<String>("name")
//!                 .build()
//!         })
//!     }
//!
//!     fn record_metadata(&self) -> &'static RecordMetadata {
//!         Self::metadata()
//!     }
//!
//!     fn field_value(&self, field: &str) -> Value<'_> {
//!         match field {
//!             "id" => self.id.as_value(),
//!             "name" => self.name.as_value(),
//!             _ => Value::Null,
//!         }
//!     }
//!
//!     fn related(&self, _relation: &str) -> Related<'_> {
//!         Related::Unknown
//!     }
//!
//!     fn set_field(&mut self, field: &str, value: Literal) -> Result<()> {
//!         match field {
//!             "id" => self.id = Scalar::from_literal(value)?,
//!             "name" => self.name = Scalar::from_literal(value)?,
//!             _ => return Err(openquery::QueryError::unknown_field(field)),
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use crate::error::Result;
use crate::metadata::RecordMetadata;
use crate::value::{Literal, Value};

/// Trait for types that can be queried, shaped and patched.
pub trait Record: Send + Sync + 'static {
    /// Returns the shared, immutable metadata for this type.
    fn metadata() -> &'static RecordMetadata
    where
        Self: Sized;

    /// Object-safe access to [`Record::metadata`].
    fn record_metadata(&self) -> &'static RecordMetadata;

    /// Returns the value of a scalar field, or [`Value::Null`] if the field
    /// doesn't exist or is unset.
    fn field_value(&self, field: &str) -> Value<'_>;

    /// Returns the records behind a relation field.
    fn related(&self, relation: &str) -> Related<'_>;

    /// Writes a scalar field. The literal must match the field type.
    fn set_field(&mut self, field: &str, value: Literal) -> Result<()>;
}

/// Records reachable through a relation.
pub enum Related<'a> {
    /// Single-valued relation, `None` when unset.
    One(Option<&'a dyn Record>),
    /// Collection relation.
    Many(Vec<&'a dyn Record>),
    /// No relation with that name.
    Unknown,
}

impl<'a> Related<'a> {
    /// Iterates every related record regardless of cardinality.
    pub fn records(self) -> Vec<&'a dyn Record> {
        match self {
            Related::One(Some(record)) => vec![record],
            Related::Many(records) => records,
            Related::One(None) | Related::Unknown => Vec::new(),
        }
    }
}

impl std::fmt::Debug for Related<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Related::One(Some(r)) => write!(f, "One({})", r.record_metadata().name()),
            Related::One(None) => f.write_str("One(None)"),
            Related::Many(rs) => write!(f, "Many({})", rs.len()),
            Related::Unknown => f.write_str("Unknown"),
        }
    }
}

impl<T: Record> Record for Box<T> {
    fn metadata() -> &'static RecordMetadata {
        T::metadata()
    }

    fn record_metadata(&self) -> &'static RecordMetadata {
        (**self).record_metadata()
    }

    fn field_value(&self, field: &str) -> Value<'_> {
        (**self).field_value(field)
    }

    fn related(&self, relation: &str) -> Related<'_> {
        (**self).related(relation)
    }

    fn set_field(&mut self, field: &str, value: Literal) -> Result<()> {
        (**self).set_field(field, value)
    }
}
