//! Per-type record metadata.
//!
//! A [`RecordMetadata`] table is built once per record type and shared by
//! every request. [`cached`] stores the table in a process-wide registry keyed
//! by [`TypeId`]; the first caller builds it, everyone after that reads it.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::error::{QueryError, Result};
use crate::scalar::{RelationField, Scalar};
use crate::value::{FieldType, Literal};

/// What a field holds.
#[derive(Clone, Copy)]
pub enum FieldKind {
    /// A scalar value of the given type.
    Scalar(FieldType),
    /// A relation to another record type.
    Relation(RelationMeta),
}

/// Target and cardinality of a relation field.
#[derive(Clone, Copy)]
pub struct RelationMeta {
    target: fn() -> &'static RecordMetadata,
    many: bool,
}

impl RelationMeta {
    /// Metadata of the related record type.
    pub fn target(&self) -> &'static RecordMetadata {
        (self.target)()
    }

    /// `true` for collection relations.
    pub fn is_many(&self) -> bool {
        self.many
    }
}

impl fmt::Debug for RelationMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationMeta")
            .field("many", &self.many)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar(ty) => write!(f, "Scalar({ty})"),
            FieldKind::Relation(rel) => rel.fmt(f),
        }
    }
}

/// Metadata for one field of a record type.
#[derive(Debug, Clone)]
pub struct FieldMeta {
    name: &'static str,
    kind: FieldKind,
    nullable: bool,
    key: bool,
    version: bool,
    check: Option<fn(Literal) -> Result<()>>,
}

fn check_literal<F: Scalar>(literal: Literal) -> Result<()> {
    F::from_literal(literal).map(drop)
}

impl FieldMeta {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Scalar type, or `None` for relations.
    pub fn field_type(&self) -> Option<FieldType> {
        match self.kind {
            FieldKind::Scalar(ty) => Some(ty),
            FieldKind::Relation(_) => None,
        }
    }

    /// Relation info, or `None` for scalars.
    pub fn relation(&self) -> Option<RelationMeta> {
        match self.kind {
            FieldKind::Relation(rel) => Some(rel),
            FieldKind::Scalar(_) => None,
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_key(&self) -> bool {
        self.key
    }

    pub fn is_version(&self) -> bool {
        self.version
    }

    /// Verifies that `literal` can be stored in this field without writing it.
    ///
    /// Relations accept nothing.
    pub fn check(&self, literal: &Literal) -> Result<()> {
        match self.check {
            Some(check) => check(literal.clone()),
            None => Err(QueryError::type_mismatch("scalar field", "relation")),
        }
    }
}

/// Immutable field table for one record type.
pub struct RecordMetadata {
    name: &'static str,
    fields: Vec<FieldMeta>,
    index: HashMap<&'static str, usize>,
}

impl RecordMetadata {
    /// Starts building metadata for a record type named `name`.
    pub fn builder(name: &'static str) -> MetadataBuilder {
        MetadataBuilder {
            name,
            fields: Vec::new(),
        }
    }

    /// The record type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// The identifier field, if one is declared.
    pub fn key(&self) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.key)
    }

    /// The optimistic concurrency field, if one is declared.
    pub fn version(&self) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.version)
    }

    /// Scalar fields in declaration order.
    pub fn scalars(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter().filter(|f| f.field_type().is_some())
    }

    /// Relation fields in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter().filter(|f| f.relation().is_some())
    }
}

impl fmt::Debug for RecordMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordMetadata")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Typed builder for [`RecordMetadata`].
///
/// ```
/// use openquery::RecordMetadata;
///
/// let meta = RecordMetadata::builder("Task")
///     .key::<u32>("id")
///     .scalar::<String>("title")
///     .scalar::<Option<u8>>("priority")
///     .build();
///
/// assert!(meta.field("id").unwrap().is_key());
/// assert!(meta.field("priority").unwrap().is_nullable());
/// ```
pub struct MetadataBuilder {
    name: &'static str,
    fields: Vec<FieldMeta>,
}

impl MetadataBuilder {
    fn push<F: Scalar>(mut self, name: &'static str, key: bool, version: bool) -> Self {
        self.fields.push(FieldMeta {
            name,
            kind: FieldKind::Scalar(F::FIELD_TYPE),
            nullable: F::NULLABLE,
            key,
            version,
            check: Some(check_literal::<F>),
        });
        self
    }

    /// Adds a scalar field.
    pub fn scalar<F: Scalar>(self, name: &'static str) -> Self {
        self.push::<F>(name, false, false)
    }

    /// Adds the identifier field.
    pub fn key<F: Scalar>(self, name: &'static str) -> Self {
        self.push::<F>(name, true, false)
    }

    /// Adds the optimistic concurrency field.
    pub fn version<F: Scalar>(self, name: &'static str) -> Self {
        self.push::<F>(name, false, true)
    }

    /// Adds a relation field.
    pub fn relation<R: RelationField>(mut self, name: &'static str) -> Self {
        self.fields.push(FieldMeta {
            name,
            kind: FieldKind::Relation(RelationMeta {
                target: R::target,
                many: R::MANY,
            }),
            nullable: !R::MANY,
            key: false,
            version: false,
            check: None,
        });
        self
    }

    pub fn build(self) -> RecordMetadata {
        let index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name, i))
            .collect();
        RecordMetadata {
            name: self.name,
            fields: self.fields,
            index,
        }
    }
}

static REGISTRY: Lazy<RwLock<HashMap<TypeId, &'static RecordMetadata>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Returns the metadata registered for `T`, building it on first use.
///
/// `build` runs at most once per type. It must not call `cached` itself;
/// relation targets are resolved lazily through [`RelationMeta::target`].
pub fn cached<T: 'static>(build: impl FnOnce() -> RecordMetadata) -> &'static RecordMetadata {
    let id = TypeId::of::<T>();
    if let Some(meta) = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
    {
        return *meta;
    }

    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    *registry.entry(id).or_insert_with(|| {
        let meta: &'static RecordMetadata = Box::leak(Box::new(build()));
        tracing::debug!(
            record = meta.name(),
            fields = meta.fields().len(),
            "built record metadata"
        );
        meta
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;
    struct Other;

    fn sample() -> RecordMetadata {
        RecordMetadata::builder("Sample")
            .key::<u64>("id")
            .scalar::<String>("name")
            .scalar::<Option<i32>>("age")
            .version::<u32>("rev")
            .build()
    }

    #[test]
    fn builder_records_roles() {
        let meta = sample();
        assert_eq!(meta.name(), "Sample");
        assert_eq!(meta.fields().len(), 4);
        assert_eq!(meta.key().map(FieldMeta::name), Some("id"));
        assert_eq!(meta.version().map(FieldMeta::name), Some("rev"));
        assert_eq!(
            meta.field("age").and_then(FieldMeta::field_type),
            Some(FieldType::Number)
        );
        assert!(meta.field("age").unwrap().is_nullable());
        assert!(!meta.field("name").unwrap().is_nullable());
        assert!(meta.field("missing").is_none());
        assert_eq!(meta.relations().count(), 0);
        assert_eq!(meta.scalars().count(), 4);
    }

    #[test]
    fn check_validates_without_writing() {
        let meta = sample();
        let age = meta.field("age").unwrap();
        assert!(age.check(&Literal::Null).is_ok());
        assert!(age.check(&Literal::from(40i64)).is_ok());
        assert!(age.check(&Literal::from(1i64 << 40)).is_err());
        assert!(meta.field("name").unwrap().check(&Literal::Null).is_err());
    }

    #[test]
    fn cache_builds_once_per_type() {
        let mut builds = 0;
        let first = cached::<Marker>(|| {
            builds += 1;
            sample()
        });
        let second = cached::<Marker>(|| {
            builds += 1;
            sample()
        });
        assert!(std::ptr::eq(first, second));
        assert_eq!(builds, 1);

        let other = cached::<Other>(|| RecordMetadata::builder("Other").build());
        assert!(!std::ptr::eq(first, other));
        assert_eq!(other.name(), "Other");
    }
}
