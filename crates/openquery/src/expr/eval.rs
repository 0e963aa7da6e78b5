//! Expression evaluation against a record.

use std::borrow::Cow;
use std::cmp::Ordering;

use crate::record::Record;
use crate::value::{Number, Timestamp, Value};

use super::{CompareOp, Expr, Function, LogicalOp};

/// Intermediate result of evaluating a sub-expression.
#[derive(Debug, Clone, PartialEq)]
enum Operand<'a> {
    String(Cow<'a, str>),
    Number(Number),
    Timestamp(Timestamp),
    Bool(bool),
    Null,
}

impl<'a> From<Value<'a>> for Operand<'a> {
    fn from(value: Value<'a>) -> Self {
        match value {
            Value::String(s) => Operand::String(Cow::Borrowed(s)),
            Value::Number(n) => Operand::Number(n),
            Value::Timestamp(t) => Operand::Timestamp(t),
            Value::Bool(b) => Operand::Bool(b),
            Value::Null => Operand::Null,
        }
    }
}

impl Operand<'_> {
    fn is_true(&self) -> bool {
        matches!(self, Operand::Bool(true))
    }

    fn compare_to(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Operand::String(a), Operand::String(b)) => Some(a.cmp(b)),
            (Operand::Number(a), Operand::Number(b)) => a.compare(*b),
            (Operand::Timestamp(a), Operand::Timestamp(b)) => Some(a.cmp(b)),
            (Operand::Bool(a), Operand::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl Expr {
    /// Returns `true` if `record` satisfies this expression.
    ///
    /// `null` equals only `null`. Ordering comparisons involving `null`
    /// are false.
    pub fn matches(&self, record: &dyn Record) -> bool {
        self.eval(record).is_true()
    }

    fn eval<'a>(&'a self, record: &'a dyn Record) -> Operand<'a> {
        match self {
            Expr::Literal(lit) => lit.as_value().into(),
            Expr::Field(path) => path.read(record).into(),
            Expr::Not(inner) => match inner.eval(record) {
                Operand::Bool(b) => Operand::Bool(!b),
                _ => Operand::Null,
            },
            Expr::Compare { op, left, right } => {
                Operand::Bool(compare(*op, &left.eval(record), &right.eval(record)))
            }
            Expr::Logical { op, left, right } => {
                let left = left.eval(record).is_true();
                let result = match op {
                    LogicalOp::And => left && right.eval(record).is_true(),
                    LogicalOp::Or => left || right.eval(record).is_true(),
                };
                Operand::Bool(result)
            }
            Expr::Call { function, args } => {
                let args: Vec<Operand<'a>> = args.iter().map(|a| a.eval(record)).collect();
                call(*function, args)
            }
            Expr::Matches { subject, pattern } => match subject.eval(record) {
                Operand::String(s) => Operand::Bool(pattern.is_match(&s)),
                _ => Operand::Bool(false),
            },
        }
    }
}

fn compare(op: CompareOp, left: &Operand<'_>, right: &Operand<'_>) -> bool {
    let null = matches!(left, Operand::Null) || matches!(right, Operand::Null);
    if null {
        let both = matches!(left, Operand::Null) && matches!(right, Operand::Null);
        return match op {
            CompareOp::Eq => both,
            CompareOp::Ne => !both,
            _ => false,
        };
    }

    let Some(ordering) = left.compare_to(right) else {
        return op == CompareOp::Ne;
    };
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
    }
}

fn call<'a>(function: Function, args: Vec<Operand<'a>>) -> Operand<'a> {
    let mut strings = args.into_iter().map(|arg| match arg {
        Operand::String(s) => Some(s),
        _ => None,
    });
    let first = strings.next().flatten();
    let second = strings.next().flatten();

    match function {
        Function::Contains | Function::StartsWith | Function::EndsWith => {
            let (Some(haystack), Some(needle)) = (first, second) else {
                return Operand::Bool(false);
            };
            Operand::Bool(match function {
                Function::Contains => haystack.contains(&*needle),
                Function::StartsWith => haystack.starts_with(&*needle),
                _ => haystack.ends_with(&*needle),
            })
        }
        Function::ToLower => first.map_or(Operand::Null, |s| {
            Operand::String(Cow::Owned(s.to_lowercase()))
        }),
        Function::ToUpper => first.map_or(Operand::Null, |s| {
            Operand::String(Cow::Owned(s.to_uppercase()))
        }),
        Function::Length => first.map_or(Operand::Null, |s| {
            Operand::Number(Number::from(s.chars().count()))
        }),
    }
}
