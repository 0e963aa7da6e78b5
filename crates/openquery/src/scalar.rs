//! Field type traits used by `#[derive(Record)]`.
//!
//! [`Scalar`] maps a Rust field type to its [`FieldType`] tag and converts
//! between the field and [`Value`]/[`Literal`]. [`RelationField`] does the
//! same for relation containers (`Option<T>`, `Option<Box<T>>`, `Vec<T>`).

use chrono::{DateTime, Utc};

use crate::error::{QueryError, Result};
use crate::metadata::RecordMetadata;
use crate::record::{Record, Related};
use crate::value::{FieldType, Literal, Number, Timestamp, Value};

/// A field type that can be filtered, sorted, projected and patched.
pub trait Scalar: Sized {
    /// Type tag recorded in the metadata.
    const FIELD_TYPE: FieldType;

    /// Whether the field accepts `null`.
    const NULLABLE: bool = false;

    /// Borrows the field as a [`Value`].
    fn as_value(&self) -> Value<'_>;

    /// Converts a literal into the field type.
    ///
    /// Fails with [`QueryError::TypeMismatch`] when the literal has the wrong
    /// type or does not fit (e.g. `300` into a `u8`).
    fn from_literal(literal: Literal) -> Result<Self>;
}

fn mismatch<T: Scalar>(literal: &Literal) -> QueryError {
    QueryError::type_mismatch(T::FIELD_TYPE.as_str(), literal.type_name())
}

impl Scalar for String {
    const FIELD_TYPE: FieldType = FieldType::String;

    fn as_value(&self) -> Value<'_> {
        Value::String(self)
    }

    fn from_literal(literal: Literal) -> Result<Self> {
        match literal {
            Literal::String(s) => Ok(s),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl Scalar for bool {
    const FIELD_TYPE: FieldType = FieldType::Bool;

    fn as_value(&self) -> Value<'_> {
        Value::Bool(*self)
    }

    fn from_literal(literal: Literal) -> Result<Self> {
        match literal {
            Literal::Bool(b) => Ok(b),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

macro_rules! scalar_int {
    ($widen:ident: $($t:ty),*) => {
        $(
            impl Scalar for $t {
                const FIELD_TYPE: FieldType = FieldType::Number;

                fn as_value(&self) -> Value<'_> {
                    Value::Number(Number::from(*self))
                }

                fn from_literal(literal: Literal) -> Result<Self> {
                    match literal {
                        Literal::Number(n) => n
                            .$widen()
                            .and_then(|v| <$t>::try_from(v).ok())
                            .ok_or_else(|| {
                                QueryError::type_mismatch(
                                    concat!("integer in ", stringify!($t), " range"),
                                    n.to_string(),
                                )
                            }),
                        other => Err(mismatch::<Self>(&other)),
                    }
                }
            }
        )*
    };
}

scalar_int!(to_i64: i8, i16, i32, i64, isize);
scalar_int!(to_u64: u8, u16, u32, u64, usize);

impl Scalar for f64 {
    const FIELD_TYPE: FieldType = FieldType::Number;

    fn as_value(&self) -> Value<'_> {
        Value::Number(Number::F64(*self))
    }

    fn from_literal(literal: Literal) -> Result<Self> {
        match literal {
            Literal::Number(n) => Ok(n.to_f64()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl Scalar for f32 {
    const FIELD_TYPE: FieldType = FieldType::Number;

    fn as_value(&self) -> Value<'_> {
        Value::Number(Number::from(*self))
    }

    fn from_literal(literal: Literal) -> Result<Self> {
        match literal {
            Literal::Number(n) => {
                let narrowed = n.to_f64() as f32;
                if narrowed.is_finite() {
                    Ok(narrowed)
                } else {
                    Err(QueryError::type_mismatch("number in f32 range", n.to_string()))
                }
            }
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl Scalar for Timestamp {
    const FIELD_TYPE: FieldType = FieldType::Timestamp;

    fn as_value(&self) -> Value<'_> {
        Value::Timestamp(*self)
    }

    fn from_literal(literal: Literal) -> Result<Self> {
        match literal {
            Literal::Timestamp(t) => Ok(t),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl Scalar for DateTime<Utc> {
    const FIELD_TYPE: FieldType = FieldType::Timestamp;

    fn as_value(&self) -> Value<'_> {
        Value::Timestamp(Timestamp::from(*self))
    }

    fn from_literal(literal: Literal) -> Result<Self> {
        match literal {
            Literal::Timestamp(t) => t
                .to_datetime()
                .ok_or_else(|| QueryError::type_mismatch("date in range", t.0.to_string())),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: Scalar> Scalar for Option<T> {
    const FIELD_TYPE: FieldType = T::FIELD_TYPE;
    const NULLABLE: bool = true;

    fn as_value(&self) -> Value<'_> {
        match self {
            Some(v) => v.as_value(),
            None => Value::Null,
        }
    }

    fn from_literal(literal: Literal) -> Result<Self> {
        match literal {
            Literal::Null => Ok(None),
            other => T::from_literal(other).map(Some),
        }
    }
}

/// A relation container holding related records.
pub trait RelationField {
    /// The related record type.
    type Target: Record;

    /// `true` for collection relations.
    const MANY: bool;

    /// Returns the related records.
    fn related(&self) -> Related<'_>;

    /// Metadata of the related record type.
    fn target() -> &'static RecordMetadata {
        <Self::Target as Record>::metadata()
    }
}

impl<T: Record> RelationField for Option<T> {
    type Target = T;
    const MANY: bool = false;

    fn related(&self) -> Related<'_> {
        Related::One(self.as_ref().map(|r| r as &dyn Record))
    }
}

impl<T: Record> RelationField for Vec<T> {
    type Target = T;
    const MANY: bool = true;

    fn related(&self) -> Related<'_> {
        Related::Many(self.iter().map(|r| r as &dyn Record).collect())
    }
}
