//! Result envelopes.
//!
//! Records are written through a projection serializer driven by the
//! [`SelectExpandNode`]: only selected scalars are emitted and only expanded
//! relations are visited. Records never need their own `Serialize` impl.
//!
//! ```text
//! collection: {"value": [...], "count": 3, "options": {"filter": "...", "top": 2}}
//! single:     {"id": 1, "name": "...", "manager": {...}}  or  null
//! ```

use serde::ser::{SerializeMap, SerializeSeq, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::error::{QueryError, Result};
use crate::options::SelectExpandNode;
use crate::record::{Record, Related};
use crate::value::Literal;

/// Canonical echo of the options that were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orderby: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub count: bool,
}

impl AppliedOptions {
    /// `true` when no option deviates from its default.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A record shaped by a projection.
pub struct Shaped<'a> {
    record: &'a dyn Record,
    node: &'a SelectExpandNode,
}

impl<'a> Shaped<'a> {
    pub fn new(record: &'a dyn Record, node: &'a SelectExpandNode) -> Self {
        Self { record, node }
    }
}

impl Serialize for Shaped<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let meta = self.record.record_metadata();
        let mut map = serializer.serialize_map(None)?;
        for field in self.node.selected(meta) {
            map.serialize_entry(field.name(), &self.record.field_value(field.name()))?;
        }
        for (relation, child) in self.node.expansions() {
            match self.record.related(relation) {
                Related::One(Some(record)) => {
                    map.serialize_entry(relation, &Shaped::new(record, child))?
                }
                Related::One(None) => map.serialize_entry(relation, &())?,
                Related::Many(records) => map.serialize_entry(
                    relation,
                    &ShapedList {
                        records: &records,
                        node: child,
                    },
                )?,
                Related::Unknown => {}
            }
        }
        map.end()
    }
}

struct ShapedList<'a> {
    records: &'a [&'a dyn Record],
    node: &'a SelectExpandNode,
}

impl Serialize for ShapedList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.records.len()))?;
        for record in self.records {
            seq.serialize_element(&Shaped::new(*record, self.node))?;
        }
        seq.end()
    }
}

/// Single-item result: a shaped record or the empty marker.
#[derive(Debug, Clone)]
pub struct Single<T> {
    item: Option<T>,
    shape: SelectExpandNode,
    applied: AppliedOptions,
}

impl<T: Record> Single<T> {
    pub fn new(item: Option<T>, shape: SelectExpandNode, applied: AppliedOptions) -> Self {
        Self {
            item,
            shape,
            applied,
        }
    }

    pub fn item(&self) -> Option<&T> {
        self.item.as_ref()
    }

    pub fn into_item(self) -> Option<T> {
        self.item
    }

    /// The record, or [`QueryError::NotFound`].
    pub fn into_found(self) -> Result<T> {
        self.item.ok_or(QueryError::NotFound)
    }

    pub fn is_empty(&self) -> bool {
        self.item.is_none()
    }

    /// Key value of the record, used as the identity reference when echoing
    /// a created record. `None` when empty or when the record has no key.
    pub fn key(&self) -> Option<Literal> {
        let item = self.item.as_ref()?;
        let key = item.record_metadata().key()?;
        Some(item.field_value(key.name()).to_literal())
    }

    pub fn shape(&self) -> &SelectExpandNode {
        &self.shape
    }

    pub fn applied(&self) -> &AppliedOptions {
        &self.applied
    }
}

impl<T: Record> Serialize for Single<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.item {
            Some(item) => Shaped::new(item, &self.shape).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }
}

/// Collection result with the optional pre-paging total.
#[derive(Debug, Clone)]
pub struct Multiple<T> {
    items: Vec<T>,
    count: Option<usize>,
    shape: SelectExpandNode,
    applied: AppliedOptions,
}

impl<T: Record> Multiple<T> {
    pub fn new(
        items: Vec<T>,
        count: Option<usize>,
        shape: SelectExpandNode,
        applied: AppliedOptions,
    ) -> Self {
        Self {
            items,
            count,
            shape,
            applied,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Total matching records before paging, when requested.
    pub fn count(&self) -> Option<usize> {
        self.count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn shape(&self) -> &SelectExpandNode {
        &self.shape
    }

    pub fn applied(&self) -> &AppliedOptions {
        &self.applied
    }
}

impl<T: Record> Serialize for Multiple<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = 1 + usize::from(self.count.is_some()) + usize::from(!self.applied.is_empty());
        let mut state = serializer.serialize_struct("Multiple", len)?;
        let records: Vec<&dyn Record> = self.items.iter().map(|r| r as &dyn Record).collect();
        state.serialize_field(
            "value",
            &ShapedList {
                records: &records,
                node: &self.shape,
            },
        )?;
        match self.count {
            Some(count) => state.serialize_field("count", &count)?,
            None => state.skip_field("count")?,
        }
        if self.applied.is_empty() {
            state.skip_field("options")?;
        } else {
            state.serialize_field("options", &self.applied)?;
        }
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::QueryConfig;
    use crate::options::SelectExpandOption;
    use crate::resolve::fixtures::Person;

    fn shape(select: Option<&str>, expand: Option<&str>) -> SelectExpandNode {
        SelectExpandOption::parse(Person::metadata(), select, expand, &QueryConfig::default())
            .unwrap()
            .root()
            .clone()
    }

    fn alice() -> Person {
        let mut alice = Person::new(1, "Alice", 30);
        alice.manager = Some(Box::new(Person::new(2, "Bob", 50)));
        alice.reports = vec![Person::new(3, "Carol", 20)];
        alice
    }

    #[test]
    fn default_shape_emits_scalars_only() {
        let json = serde_json::to_value(Shaped::new(&alice(), &SelectExpandNode::default())).unwrap();
        assert_eq!(json, json!({"id": 1, "name": "Alice", "age": 30}));
    }

    #[test]
    fn single_exposes_key_of_the_record() {
        let shape = SelectExpandNode::default;
        let single = Single::new(Some(alice()), shape(), AppliedOptions::default());
        assert_eq!(single.key(), Some(Literal::from(1u64)));

        let empty = Single::<Person>::new(None, shape(), AppliedOptions::default());
        assert_eq!(empty.key(), None);
    }

    #[test]
    fn nested_projection() {
        let node = shape(Some("name"), Some("manager(name),reports(id)"));
        let json = serde_json::to_value(Shaped::new(&alice(), &node)).unwrap();
        assert_eq!(
            json,
            json!({
                "name": "Alice",
                "manager": {"name": "Bob"},
                "reports": [{"id": 3}],
            })
        );
    }

    #[test]
    fn unset_relation_is_null() {
        let node = shape(Some("id"), Some("manager"));
        let json = serde_json::to_value(Shaped::new(&Person::new(9, "x", 1), &node)).unwrap();
        assert_eq!(json, json!({"id": 9, "manager": null}));
    }

    #[test]
    fn multiple_envelope() {
        let applied = AppliedOptions {
            top: Some(1),
            count: true,
            ..Default::default()
        };
        let envelope = Multiple::new(vec![alice()], Some(4), shape(Some("id"), None), applied);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            json!({"value": [{"id": 1}], "count": 4, "options": {"top": 1, "count": true}})
        );

        let bare = Multiple::new(
            Vec::<Person>::new(),
            None,
            SelectExpandNode::default(),
            AppliedOptions::default(),
        );
        assert_eq!(serde_json::to_value(&bare).unwrap(), json!({"value": []}));
    }

    #[test]
    fn single_envelope() {
        let found = Single::new(Some(alice()), shape(Some("name"), None), AppliedOptions::default());
        assert_eq!(serde_json::to_value(&found).unwrap(), json!({"name": "Alice"}));

        let missing: Single<Person> =
            Single::new(None, SelectExpandNode::default(), AppliedOptions::default());
        assert!(missing.is_empty());
        assert!(serde_json::to_value(&missing).unwrap().is_null());
        assert!(matches!(missing.into_found(), Err(QueryError::NotFound)));
    }
}
