//! End-to-end tests for the query options pipeline.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use openquery::metadata::cached;
use openquery::{
    Cancellation, Literal, MemorySource, QueryError, QueryOptions, QueryParams, QueryPlan,
    QuerySource, Record, RecordMetadata, Related, RelationField, Result, Scalar, Stage, Value,
};
use serde_json::json;

use common::{employees, ids, Employee};

// ============================================================================
// Test sources
// ============================================================================

/// Records the stage names of every plan it receives.
struct RecordingSource {
    inner: MemorySource<Employee>,
    counted: Mutex<Vec<Vec<&'static str>>>,
    fetched: Mutex<Vec<Vec<&'static str>>>,
}

impl RecordingSource {
    fn new(items: Vec<Employee>) -> Self {
        Self {
            inner: MemorySource::new(items),
            counted: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QuerySource<Employee> for RecordingSource {
    async fn count(&self, plan: &QueryPlan) -> Result<usize> {
        self.counted.lock().unwrap().push(plan.stage_names());
        self.inner.count(plan).await
    }

    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<Employee>> {
        self.fetched.lock().unwrap().push(plan.stage_names());
        self.inner.fetch(plan).await
    }
}

/// Never answers.
struct StalledSource;

#[async_trait]
impl QuerySource<Employee> for StalledSource {
    async fn count(&self, _plan: &QueryPlan) -> Result<usize> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(0)
    }

    async fn fetch(&self, _plan: &QueryPlan) -> Result<Vec<Employee>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
}

struct FailingSource;

#[async_trait]
impl QuerySource<Employee> for FailingSource {
    async fn count(&self, _plan: &QueryPlan) -> Result<usize> {
        Err(QueryError::from_source("connection reset"))
    }

    async fn fetch(&self, _plan: &QueryPlan) -> Result<Vec<Employee>> {
        Err(QueryError::from_source("connection reset"))
    }
}

fn options(query: &str) -> QueryOptions<Employee> {
    QueryOptions::parse(&QueryParams::from_query(query)).unwrap()
}

// ============================================================================
// Collection pipeline
// ============================================================================

#[tokio::test]
async fn filter_order_top_and_count() {
    let source = MemorySource::new(employees(&[(1, 20), (2, 30), (3, 40), (4, 35)]));
    let result = options("filter=age gt 25&orderby=age desc&top=2&count=true")
        .apply_to(&source, &Cancellation::never())
        .await
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    let rows: Vec<_> = json["value"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| (row["id"].clone(), row["age"].clone()))
        .collect();
    assert_eq!(rows, [(json!(3), json!(40)), (json!(4), json!(35))]);
    assert_eq!(json["count"], 3);
    assert_eq!(json["options"]["filter"], "age gt 25");
}

#[tokio::test]
async fn count_ignores_the_paging_window() {
    let ages: Vec<(u64, i64)> = (1..=10).map(|n| (n, n as i64)).collect();
    let source = MemorySource::new(employees(&ages));
    let result = options("filter=age gt 6&orderby=age&skip=1&top=2&count=true")
        .apply_to(&source, &Cancellation::never())
        .await
        .unwrap();

    assert_eq!(ids(result.items()), [8, 9]);
    assert_eq!(result.count(), Some(4));
}

#[tokio::test]
async fn count_runs_before_paging_and_fetch_after() {
    let source = RecordingSource::new(employees(&[(1, 20), (2, 30)]));
    options("filter=age gt 1&orderby=name&expand=manager&skip=1&top=5&count=true")
        .apply_to(&source, &Cancellation::never())
        .await
        .unwrap();

    assert_eq!(
        *source.counted.lock().unwrap(),
        [vec!["include", "orderby", "filter"]]
    );
    assert_eq!(
        *source.fetched.lock().unwrap(),
        [vec!["include", "orderby", "filter", "skip", "top"]]
    );
}

#[tokio::test]
async fn paging_before_filtering_gives_a_different_window() {
    let items = employees(&[(1, 50), (2, 10), (3, 40), (4, 20), (5, 30)]);
    let parsed = options("filter=age ge 30&orderby=age&skip=1&top=1");

    let correct = parsed
        .apply_to(&MemorySource::new(items.clone()), &Cancellation::never())
        .await
        .unwrap();
    assert_eq!(ids(correct.items()), [3]);

    // The same stages with paging moved ahead of the filter.
    let filter = parsed.filter().expr().cloned().unwrap();
    let misordered = QueryPlan::new()
        .then(Stage::OrderBy(parsed.order_by().clone()))
        .then(Stage::Skip(1))
        .then(Stage::Top(1))
        .then(Stage::Filter(filter));
    let wrong: Vec<u64> = misordered.execute(&items).iter().map(|e| e.id).collect();
    assert_ne!(wrong, ids(correct.items()));
}

#[tokio::test]
async fn no_orderby_keeps_source_order() {
    let source = MemorySource::new(employees(&[(3, 1), (1, 2), (2, 3)]));
    let result = options("")
        .apply_to(&source, &Cancellation::never())
        .await
        .unwrap();
    assert_eq!(ids(result.items()), [3, 1, 2]);
    assert_eq!(result.count(), None);
    assert_eq!(serde_json::to_value(&result).unwrap().get("options"), None);
}

#[tokio::test]
async fn nulls_sort_last() {
    let mut items = employees(&[(1, 30), (2, 10)]);
    items.push(Employee {
        id: 3,
        ..Default::default()
    });
    let source = MemorySource::new(items);
    for (query, expected) in [("orderby=age", [2, 1, 3]), ("orderby=age desc", [1, 2, 3])] {
        let result = options(query)
            .apply_to(&source, &Cancellation::never())
            .await
            .unwrap();
        assert_eq!(ids(result.items()), expected, "{query}");
    }
}

#[tokio::test]
async fn filters_through_relations() {
    let mut items = employees(&[(1, 20), (2, 30)]);
    items[0].manager = Some(Box::new(Employee::new(10, "boss", 60)));
    let source = MemorySource::new(items);
    let result = options("filter=manager.age gt 50")
        .apply_to(&source, &Cancellation::never())
        .await
        .unwrap();
    assert_eq!(ids(result.items()), [1]);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn every_bad_parameter_is_reported_with_its_name() {
    let params = QueryParams::new()
        .filter("agee gt 1")
        .orderby("age, nmae desc")
        .select("id,idd")
        .expand("bosses")
        .top("-2");
    let Err(QueryError::BadRequest(bad)) = QueryOptions::<Employee>::parse(&params) else {
        panic!("expected a bad request");
    };

    let unknown = |parameter: &str| match bad.for_parameter(parameter) {
        Some(QueryError::UnknownField { name }) => name.clone(),
        other => panic!("{parameter}: {other:?}"),
    };
    assert_eq!(unknown("filter"), "agee");
    assert_eq!(unknown("orderby"), "nmae");
    assert_eq!(unknown("select"), "idd");
    assert_eq!(unknown("expand"), "bosses");
    assert!(matches!(
        bad.for_parameter("top"),
        Some(QueryError::InvalidValue { .. })
    ));

    let json = serde_json::to_value(&bad).unwrap();
    assert_eq!(json["errors"].as_array().unwrap().len(), 5);
}

#[test]
fn deeply_nested_filters_are_rejected() {
    let depth = 10_000;
    let parens = format!("{}age gt 1{}", "(".repeat(depth), ")".repeat(depth));
    let nots = format!("{}(age gt 1)", "not ".repeat(depth));
    for filter in [parens, nots] {
        let Err(QueryError::BadRequest(bad)) =
            QueryOptions::<Employee>::parse(&QueryParams::new().filter(filter))
        else {
            panic!("expected a bad request");
        };
        assert!(matches!(
            bad.for_parameter("filter"),
            Some(QueryError::Parse { .. })
        ));
    }
}

#[test]
fn expansion_depth_is_bounded() {
    let params = QueryParams::new().expand("manager(manager(manager(manager(manager(manager)))))");
    let err = QueryOptions::<Employee>::parse(&params).unwrap_err();
    let QueryError::BadRequest(bad) = err else {
        panic!("expected a bad request");
    };
    assert!(matches!(
        bad.for_parameter("expand"),
        Some(QueryError::ExpansionTooDeep { max_depth: 5, .. })
    ));
}

#[tokio::test]
async fn source_errors_propagate() {
    let err = options("count=true")
        .apply_to(&FailingSource, &Cancellation::never())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Source(_)));
    assert!(!err.is_client_error());
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn cancellation_aborts_a_stalled_fetch() {
    let (handle, cancel) = Cancellation::new();
    let parsed = options("top=1");
    let (result, ()) = tokio::join!(parsed.apply_to(&StalledSource, &cancel), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
    });
    assert!(matches!(result, Err(QueryError::Cancelled)));
}

#[tokio::test]
async fn cancellation_aborts_a_stalled_count() {
    let (handle, cancel) = Cancellation::new();
    let parsed = options("count=true");
    let (result, ()) = tokio::join!(parsed.apply_to(&StalledSource, &cancel), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
    });
    assert!(matches!(result, Err(QueryError::Cancelled)));
}

// ============================================================================
// Single item and create
// ============================================================================

#[tokio::test]
async fn single_item_lookup() {
    let source = MemorySource::new(employees(&[(1, 20), (2, 30)]));
    let parsed = options("select=name");
    let cancel = Cancellation::never();

    let plan = QueryPlan::by_key(Employee::metadata(), 2u64).unwrap();
    let found = parsed
        .apply_to_single_async(&source, &plan, &cancel)
        .await
        .unwrap();
    assert_eq!(serde_json::to_value(&found).unwrap(), json!({"name": "e2"}));

    let plan = QueryPlan::by_key(Employee::metadata(), 7u64).unwrap();
    let missing = parsed
        .apply_to_single_async(&source, &plan, &cancel)
        .await
        .unwrap();
    assert!(matches!(missing.into_found(), Err(QueryError::NotFound)));
}

#[test]
fn created_record_echo() {
    let created = Employee::new(9, "new", 25);
    let single = QueryOptions::<Employee>::default().apply_to_single(created);
    assert_eq!(
        serde_json::to_value(&single).unwrap(),
        json!({"id": 9, "name": "new", "age": 25, "hired": null, "revision": 0})
    );
}

// ============================================================================
// Relation loading
// ============================================================================

/// A record that counts how often its relations are visited.
#[derive(Clone)]
struct Tracked {
    id: u32,
    name: String,
    lookups: Arc<AtomicUsize>,
    parent: Option<Box<Tracked>>,
}

impl Tracked {
    fn new(id: u32, name: &str, lookups: &Arc<AtomicUsize>) -> Self {
        Tracked {
            id,
            name: name.to_string(),
            lookups: Arc::clone(lookups),
            parent: None,
        }
    }
}

impl Record for Tracked {
    fn metadata() -> &'static RecordMetadata {
        cached::<Self>(|| {
            RecordMetadata::builder("Tracked")
                .key::<u32>("id")
                .scalar::<String>("name")
                .relation::<Option<Box<Tracked>>>("parent")
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
            _ => Value::Null,
        }
    }

    fn related(&self, relation: &str) -> Related<'_> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match relation {
            "parent" => self.parent.related(),
            _ => Related::Unknown,
        }
    }

    fn set_field(&mut self, field: &str, _value: Literal) -> Result<()> {
        Err(QueryError::unknown_field(field))
    }
}

#[tokio::test]
async fn unexpanded_relations_are_never_visited() {
    let lookups = Arc::new(AtomicUsize::new(0));
    let mut child = Tracked::new(2, "child", &lookups);
    child.parent = Some(Box::new(Tracked::new(1, "root", &lookups)));
    let source = MemorySource::new(vec![child]);

    let params = QueryParams::new().filter("name eq 'child'").orderby("id");
    let result = QueryOptions::<Tracked>::parse(&params)
        .unwrap()
        .apply_to(&source, &Cancellation::never())
        .await
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(lookups.load(Ordering::SeqCst), 0);
    assert_eq!(json["value"], json!([{"id": 2, "name": "child"}]));
}

#[tokio::test]
async fn nested_selection_emits_only_requested_fields() {
    let lookups = Arc::new(AtomicUsize::new(0));
    let mut child = Tracked::new(2, "child", &lookups);
    child.parent = Some(Box::new(Tracked::new(1, "root", &lookups)));
    let source = MemorySource::new(vec![child]);

    let params = QueryParams::new().select("id").expand("parent(name)");
    let result = QueryOptions::<Tracked>::parse(&params)
        .unwrap()
        .apply_to(&source, &Cancellation::never())
        .await
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["value"], json!([{"id": 2, "parent": {"name": "root"}}]));
    // Only the requested relation on the outer record was visited.
    assert_eq!(lookups.load(Ordering::SeqCst), 1);
}
