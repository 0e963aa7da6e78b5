//! The query options coordinator.
//!
//! [`QueryOptions`] holds one parsed instance of every option for a record
//! type and composes them into a [`QueryPlan`] in a fixed order:
//!
//! ```text
//! include -> orderby -> filter -> [count] -> skip -> top -> fetch
//! ```
//!
//! The count, when requested, runs over the plan before any paging stage is
//! appended, so it reports the size of the filtered set regardless of the
//! paging window.
//!
//! With no `orderby` the result order is whatever the source yields. For
//! [`MemorySource`](crate::MemorySource) that is insertion order; other
//! sources make no promise that it is stable across calls.
//!
//! # Example
//!
//! ```
//! use openquery::{Cancellation, MemorySource, QueryOptions, QueryParams};
//! # use openquery::{Literal, Record, RecordMetadata, Related, Result, Value};
//! # #[derive(Clone)]
//! # struct Person { id: u32, age: i32 }
//! # impl Record for Person {
//! #     fn metadata() -> &'static RecordMetadata {
//! #         openquery::metadata::cached::<Self>(|| {
//! #             RecordMetadata::builder("Person").key::<u32>("id").scalar::<i32>("age").build()
//! #         })
//! #     }
//! #     fn record_metadata(&self) -> &'static RecordMetadata { Self::metadata() }
//! #     fn field_value(&self, name: &str) -> Value<'_> {
//! #         match name {
//! #             "id" => openquery::Scalar::as_value(&self.id),
//! #             "age" => openquery::Scalar::as_value(&self.age),
//! #             _ => Value::Null,
//! #         }
//! #     }
//! #     fn related(&self, _: &str) -> Related<'_> { Related::Unknown }
//! #     fn set_field(&mut self, name: &str, value: Literal) -> Result<()> {
//! #         Err(openquery::QueryError::unknown_field(name))
//! #     }
//! # }
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let source = MemorySource::new(vec![
//!     Person { id: 1, age: 20 },
//!     Person { id: 2, age: 30 },
//!     Person { id: 3, age: 40 },
//! ]);
//! let params = QueryParams::from_query("filter=age gt 25&orderby=age desc&top=1&count=true");
//! let options = QueryOptions::<Person>::parse(&params)?;
//! let result = options.apply_to(&source, &Cancellation::never()).await?;
//!
//! assert_eq!(result.items()[0].id, 3);
//! assert_eq!(result.count(), Some(2));
//! # Ok::<_, openquery::QueryError>(())
//! # }).unwrap();
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::cancel::Cancellation;
use crate::config::QueryConfig;
use crate::envelope::{AppliedOptions, Multiple, Single};
use crate::error::{BadRequest, QueryError, Result};
use crate::metadata::RecordMetadata;
use crate::options::{
    CountOption, FilterOption, OrderByOption, QueryParams, SelectExpandOption, SkipOption,
    TopOption,
};
use crate::record::Record;
use crate::source::{QueryPlan, QuerySource, Stage};

/// Parsed, validated query options for records of type `T`.
///
/// Created per request and immutable after parsing.
pub struct QueryOptions<T> {
    meta: &'static RecordMetadata,
    filter: FilterOption,
    order_by: OrderByOption,
    select_expand: SelectExpandOption,
    skip: SkipOption,
    top: TopOption,
    count: CountOption,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> QueryOptions<T> {
    /// Parses every option with the default configuration.
    pub fn parse(params: &QueryParams) -> Result<Self> {
        Self::parse_with(params, &QueryConfig::default())
    }

    /// Parses every option, collecting all parameter errors into one
    /// [`QueryError::BadRequest`].
    pub fn parse_with(params: &QueryParams, config: &QueryConfig) -> Result<Self> {
        let meta = T::metadata();
        let mut errors = BadRequest::new();

        let filter = collect(&mut errors, FilterOption::parse(meta, params.filter.as_deref()));
        let order_by = collect(&mut errors, OrderByOption::parse(meta, params.orderby.as_deref()));
        let select_expand = collect(
            &mut errors,
            SelectExpandOption::parse(
                meta,
                params.select.as_deref(),
                params.expand.as_deref(),
                config,
            ),
        );
        let skip = collect(&mut errors, SkipOption::parse(params.skip.as_deref()));
        let top = collect(
            &mut errors,
            TopOption::parse(params.top.as_deref(), config.max_top),
        );
        let count = collect(&mut errors, CountOption::parse(params.count.as_deref()));

        if !errors.is_empty() {
            tracing::warn!(
                record = meta.name(),
                errors = errors.errors().len(),
                "rejected query options: {errors}"
            );
            return Err(errors.into());
        }

        let options = Self {
            meta,
            filter: filter.unwrap_or_default(),
            order_by: order_by.unwrap_or_default(),
            select_expand: select_expand.unwrap_or_default(),
            skip: skip.unwrap_or_default(),
            top: top.unwrap_or_default(),
            count: count.unwrap_or_default(),
            _record: PhantomData,
        };
        tracing::debug!(record = meta.name(), options = %options, "parsed query options");
        Ok(options)
    }

    // ========================================================================
    // Builders
    // ========================================================================

    pub fn with_filter(mut self, filter: FilterOption) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_order_by(mut self, order_by: OrderByOption) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_select_expand(mut self, select_expand: SelectExpandOption) -> Self {
        self.select_expand = select_expand;
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = SkipOption::new(skip);
        self
    }

    pub fn with_top(mut self, top: usize) -> Self {
        self.top = TopOption::new(top);
        self
    }

    pub fn with_count(mut self, requested: bool) -> Self {
        self.count = CountOption::new(requested);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn metadata(&self) -> &'static RecordMetadata {
        self.meta
    }

    pub fn filter(&self) -> &FilterOption {
        &self.filter
    }

    pub fn order_by(&self) -> &OrderByOption {
        &self.order_by
    }

    pub fn select_expand(&self) -> &SelectExpandOption {
        &self.select_expand
    }

    pub fn skip(&self) -> SkipOption {
        self.skip
    }

    pub fn top(&self) -> TopOption {
        self.top
    }

    pub fn count(&self) -> CountOption {
        self.count
    }

    /// Canonical description of the non-default options.
    pub fn applied(&self) -> AppliedOptions {
        AppliedOptions {
            filter: (!self.filter.is_identity()).then(|| self.filter.to_string()),
            orderby: (!self.order_by.is_empty()).then(|| self.order_by.to_string()),
            select: (!self.select_expand.is_default()).then(|| self.select_expand.to_string()),
            skip: (!self.skip.is_zero()).then(|| self.skip.value()),
            top: self.top.value(),
            count: self.count.requested(),
        }
    }

    // ========================================================================
    // Plans
    // ========================================================================

    /// The plan the count runs against: include, orderby and filter.
    ///
    /// Stages whose option is at its default are left out.
    pub fn filtered_plan(&self) -> QueryPlan {
        let mut plan = QueryPlan::new();
        if !self.select_expand.is_default() {
            plan = plan.then(Stage::Include(self.select_expand.root().clone()));
        }
        if !self.order_by.is_empty() {
            plan = plan.then(Stage::OrderBy(self.order_by.clone()));
        }
        if let Some(expr) = self.filter.expr() {
            plan = plan.then(Stage::Filter(expr.clone()));
        }
        plan
    }

    /// The full collection plan: [`filtered_plan`](Self::filtered_plan)
    /// followed by skip and top.
    pub fn paged_plan(&self) -> QueryPlan {
        self.page(self.filtered_plan())
    }

    fn page(&self, mut plan: QueryPlan) -> QueryPlan {
        if !self.skip.is_zero() {
            plan = plan.then(Stage::Skip(self.skip.value()));
        }
        if let Some(top) = self.top.value() {
            plan = plan.then(Stage::Top(top));
        }
        plan
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Runs the collection pipeline against `source`.
    ///
    /// The count (if requested) and the fetch are separate suspension points,
    /// run in that order. Either one returns [`QueryError::Cancelled`] once
    /// `cancel` fires.
    pub async fn apply_to<S>(&self, source: &S, cancel: &Cancellation) -> Result<Multiple<T>>
    where
        S: QuerySource<T> + ?Sized,
    {
        let filtered = self.filtered_plan();
        let count = if self.count.requested() {
            tracing::debug!(record = self.meta.name(), stages = ?filtered.stage_names(), "counting");
            Some(cancel.run("count", source.count(&filtered)).await?)
        } else {
            None
        };

        let plan = self.page(filtered);
        tracing::debug!(record = self.meta.name(), stages = ?plan.stage_names(), "fetching");
        let items = cancel.run("fetch", source.fetch(&plan)).await?;

        Ok(Multiple::new(
            items,
            count,
            self.select_expand.root().clone(),
            self.applied(),
        ))
    }

    /// Runs the single-item contract against a plan already narrowed to at
    /// most one record, e.g. by [`QueryPlan::by_key`].
    ///
    /// Only select/expand is applied. No match yields an empty [`Single`];
    /// more than one match is [`QueryError::MultipleRecords`].
    pub async fn apply_to_single_async<S>(
        &self,
        source: &S,
        narrowed: &QueryPlan,
        cancel: &Cancellation,
    ) -> Result<Single<T>>
    where
        S: QuerySource<T> + ?Sized,
    {
        let mut plan = QueryPlan::new();
        if !self.select_expand.is_default() {
            plan = plan.then(Stage::Include(self.select_expand.root().clone()));
        }
        for stage in narrowed.stages() {
            plan = plan.then(stage.clone());
        }
        // Two is enough to tell "one" from "many".
        plan = plan.then(Stage::Top(2));

        tracing::debug!(record = self.meta.name(), stages = ?plan.stage_names(), "fetching single");
        let mut items = cancel.run("fetch", source.fetch(&plan)).await?;
        if items.len() > 1 {
            return Err(QueryError::MultipleRecords { found: items.len() });
        }
        Ok(self.shape_single(items.pop()))
    }

    /// Shapes an in-hand record, such as one that was just created.
    pub fn apply_to_single(&self, item: T) -> Single<T> {
        self.shape_single(Some(item))
    }

    fn shape_single(&self, item: Option<T>) -> Single<T> {
        let applied = AppliedOptions {
            select: (!self.select_expand.is_default()).then(|| self.select_expand.to_string()),
            ..AppliedOptions::default()
        };
        Single::new(item, self.select_expand.root().clone(), applied)
    }
}

fn collect<O>(errors: &mut BadRequest, parsed: std::result::Result<O, BadRequest>) -> Option<O> {
    match parsed {
        Ok(option) => Some(option),
        Err(bad) => {
            errors.extend(bad);
            None
        }
    }
}

impl<T: Record> Default for QueryOptions<T> {
    fn default() -> Self {
        Self {
            meta: T::metadata(),
            filter: FilterOption::default(),
            order_by: OrderByOption::default(),
            select_expand: SelectExpandOption::default(),
            skip: SkipOption::default(),
            top: TopOption::default(),
            count: CountOption::default(),
            _record: PhantomData,
        }
    }
}

impl<T> Clone for QueryOptions<T> {
    fn clone(&self) -> Self {
        Self {
            meta: self.meta,
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            select_expand: self.select_expand.clone(),
            skip: self.skip,
            top: self.top,
            count: self.count,
            _record: PhantomData,
        }
    }
}

impl<T> fmt::Debug for QueryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("record", &self.meta.name())
            .field("filter", &self.filter)
            .field("order_by", &self.order_by)
            .field("select_expand", &self.select_expand)
            .field("skip", &self.skip)
            .field("top", &self.top)
            .field("count", &self.count)
            .finish()
    }
}

/// Query-string form of the non-default options, e.g.
/// `filter=age gt 25&orderby=age desc&top=2`.
impl<T> fmt::Display for QueryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.filter.is_identity() {
            parts.push(format!("filter={}", self.filter));
        }
        if !self.order_by.is_empty() {
            parts.push(format!("orderby={}", self.order_by));
        }
        if !self.select_expand.is_default() {
            parts.push(format!("select={}", self.select_expand));
        }
        if !self.skip.is_zero() {
            parts.push(format!("skip={}", self.skip));
        }
        if self.top.value().is_some() {
            parts.push(format!("top={}", self.top));
        }
        if self.count.requested() {
            parts.push("count=true".to_string());
        }
        f.write_str(&parts.join("&"))
    }
}
