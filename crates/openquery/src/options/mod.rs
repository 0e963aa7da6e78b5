//! Query option parsers.
//!
//! Each option parses one raw parameter string into a validated value. Parse
//! errors are returned as a [`BadRequest`](crate::BadRequest) tagged with the
//! parameter name so the coordinator can report every problem at once.

mod count;
mod filter;
mod order_by;
mod paging;
mod select_expand;

pub use count::CountOption;
pub use filter::FilterOption;
pub use order_by::{compare_values, Dir, OrderByOption, OrderKey};
pub use paging::{SkipOption, TopOption};
pub use select_expand::{SelectExpandNode, SelectExpandOption};

use serde::Deserialize;

/// Raw query parameter strings as received from the transport.
///
/// Accepts bare (`filter`) and prefixed (`$filter`) names.
///
/// ```
/// use openquery::QueryParams;
///
/// let params = QueryParams::from_query("$filter=age%20gt%2025&top=2&count=true");
/// assert_eq!(params.filter.as_deref(), Some("age gt 25"));
/// assert_eq!(params.top.as_deref(), Some("2"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    #[serde(alias = "$filter")]
    pub filter: Option<String>,
    #[serde(alias = "$orderby")]
    pub orderby: Option<String>,
    #[serde(alias = "$select")]
    pub select: Option<String>,
    #[serde(alias = "$expand")]
    pub expand: Option<String>,
    #[serde(alias = "$skip")]
    pub skip: Option<String>,
    #[serde(alias = "$top")]
    pub top: Option<String>,
    #[serde(alias = "$count")]
    pub count: Option<String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds parameters from decoded name/value pairs. Unrecognized names
    /// are ignored; a repeated name keeps the last value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (name, value) in pairs {
            let name = name.as_ref();
            let slot = match name.strip_prefix('$').unwrap_or(name) {
                "filter" => &mut params.filter,
                "orderby" => &mut params.orderby,
                "select" => &mut params.select,
                "expand" => &mut params.expand,
                "skip" => &mut params.skip,
                "top" => &mut params.top,
                "count" => &mut params.count,
                _ => continue,
            };
            *slot = Some(value.into());
        }
        params
    }

    /// Parses a URL query string (`a=1&b=2`, percent-encoded).
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    pub fn filter(mut self, value: impl Into<String>) -> Self {
        self.filter = Some(value.into());
        self
    }

    pub fn orderby(mut self, value: impl Into<String>) -> Self {
        self.orderby = Some(value.into());
        self
    }

    pub fn select(mut self, value: impl Into<String>) -> Self {
        self.select = Some(value.into());
        self
    }

    pub fn expand(mut self, value: impl Into<String>) -> Self {
        self.expand = Some(value.into());
        self
    }

    pub fn skip(mut self, value: impl ToString) -> Self {
        self.skip = Some(value.to_string());
        self
    }

    pub fn top(mut self, value: impl ToString) -> Self {
        self.top = Some(value.to_string());
        self
    }

    pub fn count(mut self, value: impl ToString) -> Self {
        self.count = Some(value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_accept_prefixed_names() {
        let params = QueryParams::from_pairs([
            ("$filter", "age gt 1"),
            ("orderby", "age"),
            ("$unknown", "x"),
            ("top", "1"),
            ("top", "2"),
        ]);
        assert_eq!(params.filter.as_deref(), Some("age gt 1"));
        assert_eq!(params.orderby.as_deref(), Some("age"));
        assert_eq!(params.top.as_deref(), Some("2"));
        assert_eq!(params.skip, None);
    }

    #[test]
    fn query_string_is_decoded() {
        let params = QueryParams::from_query("?filter=name+eq+%27a%26b%27&$expand=manager(name)");
        assert_eq!(params.filter.as_deref(), Some("name eq 'a&b'"));
        assert_eq!(params.expand.as_deref(), Some("manager(name)"));
    }

    #[test]
    fn deserializes_with_aliases() {
        let params: QueryParams =
            serde_json::from_str(r#"{"$filter": "age gt 1", "count": "true"}"#).unwrap();
        assert_eq!(params, QueryParams::new().filter("age gt 1").count(true));
    }
}
