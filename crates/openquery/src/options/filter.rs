use std::fmt;

use crate::error::{BadRequest, ParameterError};
use crate::expr::{self, Expr};
use crate::metadata::RecordMetadata;
use crate::record::Record;

/// The `filter` option: a type-checked predicate, or the identity filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOption {
    expr: Option<Expr>,
}

impl FilterOption {
    pub const PARAMETER: &'static str = "filter";

    /// Parses `raw`. Absent or blank input yields the identity filter.
    pub fn parse(meta: &'static RecordMetadata, raw: Option<&str>) -> Result<Self, BadRequest> {
        let Some(text) = raw.filter(|s| !s.trim().is_empty()) else {
            return Ok(Self::default());
        };
        expr::parse(meta, text)
            .map(|expr| Self { expr: Some(expr) })
            .map_err(|e| ParameterError::new(Self::PARAMETER, e.error).at(e.position).into())
    }

    /// Wraps an already parsed expression.
    pub fn from_expr(expr: Expr) -> Self {
        Self { expr: Some(expr) }
    }

    pub fn expr(&self) -> Option<&Expr> {
        self.expr.as_ref()
    }

    /// `true` when no predicate was given.
    pub fn is_identity(&self) -> bool {
        self.expr.is_none()
    }

    pub fn matches(&self, record: &dyn Record) -> bool {
        self.expr.as_ref().map_or(true, |e| e.matches(record))
    }
}

impl fmt::Display for FilterOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expr {
            Some(expr) => write!(f, "{expr}"),
            None => Ok(()),
        }
    }
}
