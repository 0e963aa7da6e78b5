//! Composable query plans and the data source interface.
//!
//! A [`QueryPlan`] is a not-yet-executed query: an ordered list of stages
//! appended by the coordinator. A [`QuerySource`] executes a plan. Stage
//! order matters and sources must apply stages in the order given.

use async_trait::async_trait;

use crate::error::{QueryError, Result};
use crate::expr::{CompareOp, Expr};
use crate::metadata::RecordMetadata;
use crate::options::{OrderByOption, SelectExpandNode};
use crate::record::Record;
use crate::resolve::resolve_scalar;
use crate::value::Literal;

/// One step of a query plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Relations to load alongside each record.
    Include(SelectExpandNode),
    OrderBy(OrderByOption),
    Filter(Expr),
    Skip(usize),
    Top(usize),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Include(_) => "include",
            Stage::OrderBy(_) => "orderby",
            Stage::Filter(_) => "filter",
            Stage::Skip(_) => "skip",
            Stage::Top(_) => "top",
        }
    }
}

/// An ordered list of stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    stages: Vec<Stage>,
}

impl QueryPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plan narrowed to the record whose identifier equals `key`.
    pub fn by_key(meta: &'static RecordMetadata, key: impl Into<Literal>) -> Result<Self> {
        let field = meta
            .key()
            .ok_or_else(|| QueryError::unknown_field(format!("{}.<key>", meta.name())))?;
        let key = key.into();
        field.check(&key)?;
        let expr = Expr::Compare {
            op: CompareOp::Eq,
            left: Box::new(Expr::Field(resolve_scalar(meta, field.name())?)),
            right: Box::new(Expr::Literal(key)),
        };
        Ok(Self::new().then(Stage::Filter(expr)))
    }

    /// Appends a stage.
    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage names in order, for logging and assertions.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Runs the plan over in-memory records.
    ///
    /// `Include` is a no-op here since in-memory records carry their
    /// relations already. Sorting is stable.
    pub fn execute<'a, T: Record>(&self, items: impl IntoIterator<Item = &'a T>) -> Vec<&'a T> {
        let mut rows: Vec<&T> = items.into_iter().collect();
        for stage in &self.stages {
            match stage {
                Stage::Include(_) => {}
                Stage::OrderBy(order) => rows.sort_by(|a, b| order.compare(*a, *b)),
                Stage::Filter(expr) => rows.retain(|r| expr.matches(*r)),
                Stage::Skip(n) => {
                    rows.drain(..(*n).min(rows.len()));
                }
                Stage::Top(n) => rows.truncate(*n),
            }
        }
        rows
    }
}

/// A queryable data source for records of type `T`.
///
/// Both methods are suspension points. `count` receives the plan before any
/// paging stage is appended.
#[async_trait]
pub trait QuerySource<T: Record>: Send + Sync {
    /// Number of records the plan selects.
    async fn count(&self, plan: &QueryPlan) -> Result<usize>;

    /// Materializes the records the plan selects, in plan order.
    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<T>>;
}

/// A `Vec`-backed source.
#[derive(Debug, Clone, Default)]
pub struct MemorySource<T> {
    items: Vec<T>,
}

impl<T: Record + Clone> MemorySource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T: Record + Clone> From<Vec<T>> for MemorySource<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

#[async_trait]
impl<T: Record + Clone> QuerySource<T> for MemorySource<T> {
    async fn count(&self, plan: &QueryPlan) -> Result<usize> {
        Ok(plan.execute(&self.items).len())
    }

    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<T>> {
        Ok(plan.execute(&self.items).into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;
    use crate::resolve::fixtures::Person;

    fn people() -> Vec<Person> {
        vec![
            Person::new(1, "a", 20),
            Person::new(2, "b", 30),
            Person::new(3, "c", 40),
            Person::new(4, "d", 35),
        ]
    }

    fn ids(rows: &[&Person]) -> Vec<u32> {
        rows.iter().map(|p| p.id).collect()
    }

    #[test]
    fn executes_stages_in_order() {
        let meta = Person::metadata();
        let order = OrderByOption::parse(meta, Some("age desc")).unwrap();
        let filter = expr::parse(meta, "age lt 35").unwrap();
        let items = people();

        let plan = QueryPlan::new()
            .then(Stage::OrderBy(order.clone()))
            .then(Stage::Filter(filter.clone()))
            .then(Stage::Skip(1))
            .then(Stage::Top(1));
        assert_eq!(plan.stage_names(), ["orderby", "filter", "skip", "top"]);
        assert_eq!(ids(&plan.execute(&items)), [1]);

        // Paging before filtering selects a different window.
        let paged_first = QueryPlan::new()
            .then(Stage::OrderBy(order))
            .then(Stage::Skip(1))
            .then(Stage::Top(1))
            .then(Stage::Filter(filter));
        assert!(paged_first.execute(&items).is_empty());
    }

    #[test]
    fn skip_past_end_is_empty() {
        let items = people();
        let plan = QueryPlan::new().then(Stage::Skip(10));
        assert!(plan.execute(&items).is_empty());
    }

    #[test]
    fn by_key_narrows_to_one() {
        let items = people();
        let plan = QueryPlan::by_key(Person::metadata(), 3u32).unwrap();
        assert_eq!(ids(&plan.execute(&items)), [3]);
        assert!(matches!(
            QueryPlan::by_key(Person::metadata(), "three"),
            Err(QueryError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn memory_source_counts_and_fetches() {
        let source = MemorySource::new(people());
        let plan = QueryPlan::new().then(Stage::Filter(
            expr::parse(Person::metadata(), "age ge 30").unwrap(),
        ));
        assert_eq!(source.count(&plan).await.unwrap(), 3);
        let fetched = source.fetch(&plan.then(Stage::Top(2))).await.unwrap();
        assert_eq!(fetched.iter().map(|p| p.id).collect::<Vec<_>>(), [2, 3]);
    }
}
