//! Sort keys for the `orderby` option.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{BadRequest, ParameterError, QueryError};
use crate::metadata::RecordMetadata;
use crate::record::Record;
use crate::resolve::{resolve_scalar, FieldPath};
use crate::value::Value;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dir {
    /// Ascending order (smallest first).
    #[default]
    Asc,
    /// Descending order (largest first).
    Desc,
}

impl Dir {
    /// Applies this direction to an ordering.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Dir::Asc => ordering,
            Dir::Desc => ordering.reverse(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dir::Asc => "asc",
            Dir::Desc => "desc",
        }
    }
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub path: FieldPath,
    pub dir: Dir,
}

impl OrderKey {
    /// Compares two records on this key. `null` and NaN sort last in both
    /// directions, so the ordering stays total.
    pub fn compare(&self, a: &dyn Record, b: &dyn Record) -> Ordering {
        let (va, vb) = (self.path.read(a), self.path.read(b));
        let last = |v: &Value<'_>| v.is_null() || v.is_nan();
        match (last(&va), last(&vb)) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_values(&va, &vb).map_or(Ordering::Equal, |o| self.dir.apply(o)),
        }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path, self.dir)
    }
}

/// Compares two non-null values of the same type.
///
/// Returns `None` on type mismatch or NaN.
pub fn compare_values(a: &Value<'_>, b: &Value<'_>) -> Option<Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.compare(*b),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// The `orderby` option: primary, secondary, ... sort keys.
///
/// With no keys the result order is whatever the source produces, and is not
/// guaranteed to be stable across calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderByOption {
    keys: Vec<OrderKey>,
}

impl OrderByOption {
    pub const PARAMETER: &'static str = "orderby";

    /// Parses `field [asc|desc], ...`.
    ///
    /// Every bad segment is reported, not just the first.
    pub fn parse(meta: &'static RecordMetadata, raw: Option<&str>) -> Result<Self, BadRequest> {
        let Some(text) = raw.filter(|s| !s.trim().is_empty()) else {
            return Ok(Self::default());
        };

        let mut keys = Vec::new();
        let mut errors = BadRequest::new();
        let mut offset = 0;
        for segment in text.split(',') {
            let position = offset + (segment.len() - segment.trim_start().len());
            offset += segment.len() + 1;
            match parse_key(meta, segment) {
                Ok(key) => keys.push(key),
                Err(error) => errors.push(ParameterError::new(Self::PARAMETER, error).at(position)),
            }
        }

        errors.into_result()?;
        Ok(Self { keys })
    }

    pub fn new(keys: Vec<OrderKey>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &[OrderKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compares two records key by key. Ties on every key compare equal.
    pub fn compare(&self, a: &dyn Record, b: &dyn Record) -> Ordering {
        for key in &self.keys {
            let ordering = key.compare(a, b);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn parse_key(meta: &'static RecordMetadata, segment: &str) -> Result<OrderKey, QueryError> {
    let mut words = segment.split_whitespace();
    let Some(field) = words.next() else {
        return Err(QueryError::parse(0, "empty sort key"));
    };
    let dir = match words.next() {
        None | Some("asc") => Dir::Asc,
        Some("desc") => Dir::Desc,
        Some(other) => {
            return Err(QueryError::invalid_value(
                other,
                "sort direction must be 'asc' or 'desc'",
            ));
        }
    };
    if let Some(extra) = words.next() {
        return Err(QueryError::invalid_value(extra, "unexpected token after sort direction"));
    }
    Ok(OrderKey {
        path: resolve_scalar(meta, field)?,
        dir,
    })
}

impl fmt::Display for OrderByOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}
