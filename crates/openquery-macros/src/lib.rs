//! Proc macros for openquery.
//!
//! # Available Macros
//!
//! - [`Record`] - Generate record metadata and field accessors for a struct
//!
//! The derive is re-exported by `openquery` under its default `derive`
//! feature. See `openquery/tests/record_derive.rs` for working examples.

mod record;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derives the `Record` trait for structs exposed through query endpoints.
///
/// Every field is a scalar unless annotated otherwise. Scalar field types must
/// implement `openquery::Scalar` (strings, booleans, numbers, timestamps and
/// `Option`s of those); relation field types must implement
/// `openquery::RelationField` (`Option<T>`, `Option<Box<T>>`, `Vec<T>`).
///
/// # Field Attributes
///
/// | Attribute | Description |
/// |-----------|-------------|
/// | `key` | Identifier field, used for single-item lookups and never patchable |
/// | `version` | Concurrency token checked by patches, never written by them |
/// | `relation` | Related record or collection, reachable through `expand` |
/// | `skip` | Exclude this field from the record |
/// | `rename = "..."` | Use a custom name in queries and payloads |
///
/// # Generated Code
///
/// 1. Field name constants (e.g., `Person::NAME`, `Person::MANAGER`)
/// 2. Implementation of `Record`, with metadata cached on first use
///
/// # Example
///
/// ```ignore
/// use openquery::Record;
///
/// #[derive(Clone, Record)]
/// struct Person {
///     #[record(key)]
///     id: u32,
///     name: String,
///     age: Option<i32>,
///     #[record(version)]
///     revision: u64,
///     #[record(relation)]
///     manager: Option<Box<Person>>,
///     #[record(relation, rename = "directReports")]
///     reports: Vec<Person>,
///     #[record(skip)]
///     scratch: String,
/// }
///
/// assert_eq!(Person::NAME, "name");
/// assert_eq!(Person::DIRECT_REPORTS, "directReports");
/// assert!(Person::metadata().field("scratch").is_none());
/// ```
#[proc_macro_derive(Record, attributes(record))]
pub fn record_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::record_derive_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
