//! openquery - query options for collection endpoints.
//!
//! openquery parses the query parameters of an HTTP-style collection endpoint
//! (`filter`, `orderby`, `select`, `expand`, `skip`, `top`, `count`) into
//! typed, validated options and applies them to an abstract data source in a
//! fixed order. It also builds sparse patches that tell "set to null" apart
//! from "not mentioned".
//!
//! - Filter expressions are parsed into a closed AST and type-checked
//!   against per-type record metadata; nothing in the input is executed
//! - Every parameter error is reported at once, tagged with its parameter
//! - Count runs before paging, so it reports the size of the filtered set
//! - Responses are shaped by `select`/`expand` without touching unexpanded
//!   relations
//!
//! # Quick Start
//!
//! ```rust
//! use openquery::{Cancellation, MemorySource, QueryOptions, QueryParams, Record};
//!
//! #[derive(Clone, Record)]
//! struct Person {
//!     #[record(key)]
//!     id: u32,
//!     name: String,
//!     age: Option<i32>,
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let source = MemorySource::new(vec![
//!     Person { id: 1, name: "Ann".into(), age: Some(20) },
//!     Person { id: 2, name: "Bob".into(), age: Some(30) },
//!     Person { id: 3, name: "Cid".into(), age: Some(40) },
//!     Person { id: 4, name: "Dee".into(), age: Some(35) },
//! ]);
//!
//! let params = QueryParams::from_query("filter=age gt 25&orderby=age desc&top=2&count=true&select=id,age");
//! let options = QueryOptions::<Person>::parse(&params)?;
//! let result = options.apply_to(&source, &Cancellation::never()).await?;
//!
//! let json = serde_json::to_value(&result).unwrap();
//! assert_eq!(json["value"], serde_json::json!([{"id": 3, "age": 40}, {"id": 4, "age": 35}]));
//! assert_eq!(json["count"], 3);
//! # Ok::<_, openquery::QueryError>(())
//! # }).unwrap();
//! ```
//!
//! # Pipeline
//!
//! ```text
//! include -> orderby -> filter -> [count] -> skip -> top -> fetch
//! ```
//!
//! Stages are appended to a [`QueryPlan`] and executed by a [`QuerySource`].
//! [`MemorySource`] runs plans over a `Vec`.
//!
//! # Patching
//!
//! ```rust
//! use openquery::{Delta, Record};
//!
//! #[derive(Clone, Record)]
//! struct Person {
//!     #[record(key)]
//!     id: u32,
//!     name: String,
//!     age: Option<i32>,
//! }
//!
//! let person = Person { id: 1, name: "A".into(), age: Some(30) };
//! let delta = Delta::<Person>::from_json(&serde_json::json!({"age": 31})).unwrap();
//! let person = delta.patched(person).unwrap();
//! assert_eq!((person.name.as_str(), person.age), ("A", Some(31)));
//! ```

mod cancel;
mod config;
mod delta;
mod envelope;
mod error;
pub mod expr;
pub mod metadata;
mod options;
mod query_options;
mod record;
mod resolve;
mod scalar;
mod source;
mod value;

// Re-export public API
pub use cancel::{Cancellation, CancellationHandle};
pub use config::{QueryConfig, DEFAULT_MAX_EXPANSION_DEPTH};
pub use delta::{patch_record, Delta, PAYLOAD};
pub use envelope::{AppliedOptions, Multiple, Shaped, Single};
pub use error::{BadRequest, BoxError, ParameterError, QueryError, Result, ValidationError};
pub use expr::{Expr, ExprError};
pub use metadata::{FieldKind, FieldMeta, RecordMetadata, RelationMeta};
pub use options::{
    compare_values, CountOption, Dir, FilterOption, OrderByOption, OrderKey, QueryParams,
    SelectExpandNode, SelectExpandOption, SkipOption, TopOption,
};
pub use query_options::QueryOptions;
pub use record::{Record, Related};
pub use resolve::{resolve_path, resolve_scalar, FieldPath};
pub use scalar::{RelationField, Scalar};
pub use source::{MemorySource, QueryPlan, QuerySource, Stage};
pub use value::{FieldType, Literal, Number, Timestamp, Value};

#[cfg(feature = "derive")]
pub use openquery_macros::Record;
