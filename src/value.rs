//! Mapping between Rust field types and `sea_query::Value`.
//!
//! Every entity field is read and written through [`ValueType`]. Besides the
//! conversions, the trait defines each type's *zero state*, which is what the
//! insert path uses to decide whether a defaultable column was set by the caller:
//!
//! - `Option<T>` is zero iff it is `None`, so `Some(0)` counts as an explicit value
//! - scalars are zero at their type default (`0`, `""`, `false`, the Unix epoch, the nil UUID)
//!
//! ```rust
//! use quarry::ValueType;
//! use sea_query::Value;
//!
//! let value = ValueType::into_value(42i32);
//! assert!(matches!(value, Value::Int(Some(42))));
//!
//! assert!(ValueType::is_zero(&None::<i32>));
//! assert!(!ValueType::is_zero(&Some(0i32)));
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sea_query::Value;

/// Conversion between a Rust type and its `sea_query::Value` variant.
pub trait ValueType: Sized {
    /// Convert this value into a `sea_query::Value`.
    fn into_value(self) -> Value;

    /// Convert a `sea_query::Value` into this type.
    ///
    /// Returns `None` if the variant does not fit, or if it is NULL and the type is
    /// not an `Option`. Integer and float variants widen where no precision is lost.
    fn from_value(value: Value) -> Option<Self>;

    /// The NULL variant used when an `Option<Self>` is `None`.
    fn null_value() -> Value;

    /// Whether this value is the type's zero/absence state.
    fn is_zero(&self) -> bool;
}

/// Whether `value` is a NULL of any variant.
pub fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::ChronoDate(None)
            | Value::ChronoTime(None)
            | Value::ChronoDateTime(None)
            | Value::ChronoDateTimeUtc(None)
            | Value::ChronoDateTimeLocal(None)
            | Value::ChronoDateTimeWithTimeZone(None)
            | Value::Uuid(None)
    )
}

impl ValueType for bool {
    fn into_value(self) -> Value {
        Value::Bool(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Bool(None)
    }

    fn is_zero(&self) -> bool {
        !*self
    }
}

impl ValueType for i16 {
    fn into_value(self) -> Value {
        Value::SmallInt(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::TinyInt(Some(v)) => Some(i16::from(v)),
            Value::SmallInt(Some(v)) => Some(v),
            Value::Int(Some(v)) => i16::try_from(v).ok(),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::SmallInt(None)
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl ValueType for i32 {
    fn into_value(self) -> Value {
        Value::Int(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::TinyInt(Some(v)) => Some(i32::from(v)),
            Value::SmallInt(Some(v)) => Some(i32::from(v)),
            Value::Int(Some(v)) => Some(v),
            Value::BigInt(Some(v)) => i32::try_from(v).ok(),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Int(None)
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl ValueType for i64 {
    fn into_value(self) -> Value {
        Value::BigInt(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::TinyInt(Some(v)) => Some(i64::from(v)),
            Value::SmallInt(Some(v)) => Some(i64::from(v)),
            Value::Int(Some(v)) => Some(i64::from(v)),
            Value::BigInt(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::BigInt(None)
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl ValueType for f32 {
    fn into_value(self) -> Value {
        Value::Float(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Float(None)
    }

    fn is_zero(&self) -> bool {
        *self == 0.0
    }
}

impl ValueType for f64 {
    fn into_value(self) -> Value {
        Value::Double(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(Some(v)) => Some(f64::from(v)),
            Value::Double(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Double(None)
    }

    fn is_zero(&self) -> bool {
        *self == 0.0
    }
}

impl ValueType for String {
    fn into_value(self) -> Value {
        Value::String(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(Some(v)) => Some(v),
            Value::Char(Some(c)) => Some(c.to_string()),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::String(None)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl ValueType for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Bytes(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bytes(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Bytes(None)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

// The chrono, uuid and json variants go through sea-query's own extraction so the
// payload representation inside `Value` stays sea-query's business.

impl ValueType for DateTime<Utc> {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        <DateTime<Utc> as sea_query::ValueType>::try_from(value).ok()
    }

    fn null_value() -> Value {
        Value::ChronoDateTimeUtc(None)
    }

    fn is_zero(&self) -> bool {
        *self == DateTime::<Utc>::default()
    }
}

impl ValueType for NaiveDateTime {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        <NaiveDateTime as sea_query::ValueType>::try_from(value).ok()
    }

    fn null_value() -> Value {
        Value::ChronoDateTime(None)
    }

    fn is_zero(&self) -> bool {
        *self == NaiveDateTime::default()
    }
}

impl ValueType for NaiveDate {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        <NaiveDate as sea_query::ValueType>::try_from(value).ok()
    }

    fn null_value() -> Value {
        Value::ChronoDate(None)
    }

    fn is_zero(&self) -> bool {
        *self == NaiveDate::default()
    }
}

impl ValueType for uuid::Uuid {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        <uuid::Uuid as sea_query::ValueType>::try_from(value).ok()
    }

    fn null_value() -> Value {
        Value::Uuid(None)
    }

    fn is_zero(&self) -> bool {
        self.is_nil()
    }
}

impl ValueType for serde_json::Value {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        <serde_json::Value as sea_query::ValueType>::try_from(value).ok()
    }

    fn null_value() -> Value {
        Value::Json(None)
    }

    fn is_zero(&self) -> bool {
        self.is_null()
    }
}

impl<T: ValueType> ValueType for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => T::into_value(v),
            None => T::null_value(),
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        // Any NULL decodes to `None`: the driver picks the variant from the SQL type,
        // which may be narrower than the field's type.
        if is_null(&value) {
            return Some(None);
        }
        T::from_value(value).map(Some)
    }

    fn null_value() -> Value {
        T::null_value()
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }
}
