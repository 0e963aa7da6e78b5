//! Engine configuration.

use serde::Deserialize;

/// Default bound on nested relation expansion.
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 5;

/// Limits applied while parsing query options.
///
/// Loaded by the host from any serde format:
///
/// ```
/// use openquery::QueryConfig;
///
/// let config: QueryConfig = serde_json::from_str(r#"{"max_top": 100}"#).unwrap();
/// assert_eq!(config.max_top, Some(100));
/// assert_eq!(config.max_expansion_depth, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum nesting of expanded relations.
    pub max_expansion_depth: usize,
    /// Upper bound accepted for `top`, unbounded when `None`.
    pub max_top: Option<usize>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
            max_top: None,
        }
    }
}

impl QueryConfig {
    pub fn with_max_expansion_depth(mut self, depth: usize) -> Self {
        self.max_expansion_depth = depth;
        self
    }

    pub fn with_max_top(mut self, max_top: usize) -> Self {
        self.max_top = Some(max_top);
        self
    }
}
