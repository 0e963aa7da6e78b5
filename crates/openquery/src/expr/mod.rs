//! Filter expression language.
//!
//! Expressions are parsed into a closed set of node kinds and type-checked
//! against the record metadata. Nothing in the input is ever executed.
//!
//! ```text
//! age gt 25 and (contains(name, 'ann') or manager.age ge 50)
//! not done and created lt 2024-01-29
//! ```
//!
//! Precedence from tightest to loosest: `not`, comparison
//! (`eq ne gt ge lt le`), `and`, `or`.

mod eval;
mod lexer;
mod parser;

use std::fmt;

use regex::Regex;

use crate::error::QueryError;
use crate::resolve::FieldPath;
use crate::value::{FieldType, Literal};

pub use parser::{parse, MAX_NESTING_DEPTH};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    /// Returns the keyword for this operator.
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "eq" => CompareOp::Eq,
            "ne" => CompareOp::Ne,
            "gt" => CompareOp::Gt,
            "ge" => CompareOp::Ge,
            "lt" => CompareOp::Lt,
            "le" => CompareOp::Le,
            _ => return None,
        })
    }

    /// `true` for the operators that only test (in)equality.
    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

/// Logical connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Contains,
    StartsWith,
    EndsWith,
    ToLower,
    ToUpper,
    Length,
}

impl Function {
    pub fn as_str(self) -> &'static str {
        match self {
            Function::Contains => "contains",
            Function::StartsWith => "startswith",
            Function::EndsWith => "endswith",
            Function::ToLower => "tolower",
            Function::ToUpper => "toupper",
            Function::Length => "length",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "contains" => Function::Contains,
            "startswith" => Function::StartsWith,
            "endswith" => Function::EndsWith,
            "tolower" => Function::ToLower,
            "toupper" => Function::ToUpper,
            "length" => Function::Length,
            _ => return None,
        })
    }

    /// Number of string arguments the function takes.
    pub fn arity(self) -> usize {
        match self {
            Function::Contains | Function::StartsWith | Function::EndsWith => 2,
            Function::ToLower | Function::ToUpper | Function::Length => 1,
        }
    }

    /// Result type of a call.
    pub fn result_type(self) -> FieldType {
        match self {
            Function::Contains | Function::StartsWith | Function::EndsWith => FieldType::Bool,
            Function::ToLower | Function::ToUpper => FieldType::String,
            Function::Length => FieldType::Number,
        }
    }
}

/// A regular expression compiled at parse time.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Pattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// A type-checked filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Field(FieldPath),
    Not(Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
    /// `matchespattern(subject, 'regex')`
    Matches {
        subject: Box<Expr>,
        pattern: Pattern,
    },
}

impl Expr {
    /// Static type of the expression, `None` for the `null` literal.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Expr::Literal(lit) => lit.field_type(),
            Expr::Field(path) => path.field_type(),
            Expr::Call { function, .. } => Some(function.result_type()),
            Expr::Not(_) | Expr::Compare { .. } | Expr::Logical { .. } | Expr::Matches { .. } => {
                Some(FieldType::Bool)
            }
        }
    }

    /// Every field path referenced by the expression.
    pub fn fields(&self) -> Vec<&FieldPath> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Field(path) => out.push(path),
            Expr::Not(inner) => inner.collect_fields(out),
            Expr::Compare { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_fields(out)),
            Expr::Matches { subject, .. } => subject.collect_fields(out),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Logical {
                op: LogicalOp::Or, ..
            } => 1,
            Expr::Logical {
                op: LogicalOp::And,
                ..
            } => 2,
            Expr::Compare { .. } => 3,
            Expr::Not(_) => 4,
            _ => 5,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, parens: bool) -> fmt::Result {
        if parens {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = self.precedence();
        match self {
            Expr::Literal(lit) => write!(f, "{lit}"),
            Expr::Field(path) => write!(f, "{path}"),
            Expr::Not(inner) => {
                f.write_str("not ")?;
                inner.fmt_child(f, inner.precedence() < prec)
            }
            Expr::Compare { op, left, right } => {
                left.fmt_child(f, left.precedence() < prec)?;
                write!(f, " {} ", op.as_str())?;
                right.fmt_child(f, right.precedence() <= prec)
            }
            Expr::Logical { op, left, right } => {
                left.fmt_child(f, left.precedence() < prec)?;
                write!(f, " {} ", op.as_str())?;
                right.fmt_child(f, right.precedence() <= prec)
            }
            Expr::Call { function, args } => {
                write!(f, "{}(", function.as_str())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Matches { subject, pattern } => {
                let pattern = Literal::from(pattern.as_str());
                write!(f, "matchespattern({subject}, {pattern})")
            }
        }
    }
}

/// A parse failure with the byte offset of the offending token.
#[derive(Debug)]
pub struct ExprError {
    pub position: usize,
    pub error: QueryError,
}

impl ExprError {
    pub(crate) fn new(position: usize, error: QueryError) -> Self {
        Self { position, error }
    }

    pub(crate) fn syntax(position: usize, reason: impl Into<String>) -> Self {
        Self::new(position, QueryError::parse(position, reason))
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.error, self.position)
    }
}

impl From<ExprError> for QueryError {
    fn from(err: ExprError) -> Self {
        err.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::resolve::fixtures::Person;

    fn roundtrip(input: &str) -> String {
        let meta = Person::metadata();
        let expr = parse(meta, input).unwrap();
        let rendered = expr.to_string();
        let reparsed = parse(meta, &rendered).unwrap();
        assert_eq!(expr, reparsed, "{input} -> {rendered}");
        rendered
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(roundtrip("age   gt 25"), "age gt 25");
        assert_eq!(
            roundtrip("(age gt 1 or age lt 0) and name eq 'x'"),
            "(age gt 1 or age lt 0) and name eq 'x'"
        );
        assert_eq!(roundtrip("age eq null"), "age eq null");
        assert_eq!(
            roundtrip("not contains(name, 'it''s')"),
            "not contains(name, 'it''s')"
        );
        assert_eq!(
            roundtrip("age gt 1 and (age lt 5 and age ne 3)"),
            "age gt 1 and (age lt 5 and age ne 3)"
        );
        assert_eq!(
            roundtrip("matchespattern(name, '^A.*')"),
            "matchespattern(name, '^A.*')"
        );
        assert_eq!(roundtrip("length(tolower(name)) ge 3"), "length(tolower(name)) ge 3");
    }

    #[test]
    fn fields_lists_every_reference() {
        let expr = parse(Person::metadata(), "age gt 1 and manager.name eq name").unwrap();
        let names: Vec<String> = expr.fields().iter().map(|p| p.to_string()).collect();
        assert_eq!(names, ["age", "manager.name", "name"]);
    }
}
