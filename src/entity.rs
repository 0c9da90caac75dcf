//! Entity trait and compile-time field bindings.
//!
//! An entity type carries its [`TableDescriptor`] and one [`FieldDef`] per column.
//! A `FieldDef` is a typed accessor/mutator pair generated by `#[derive(Entity)]`,
//! so binding a column name to a struct field never involves runtime reflection.
//!
//! ```rust
//! use quarry::{Entity, Value};
//!
//! #[derive(Debug, Default, Entity)]
//! #[table_name = "roles"]
//! struct Role {
//!     #[primary_key]
//!     #[has_default]
//!     id: i32,
//!     name: Option<String>,
//! }
//!
//! let role = Role { id: 4, name: Some("admin".to_string()) };
//! let field = Role::field("name").unwrap();
//! assert_eq!((field.get)(&role), Value::String(Some("admin".to_string())));
//! assert_eq!(role.primary_key_values().unwrap(), vec![Value::Int(Some(4))]);
//! ```

use crate::error::QuarryError;
use crate::schema::TableDescriptor;
use crate::value::ValueType;
use sea_query::Value;
use std::fmt;

/// A value could not be written into a field.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub expected: &'static str,
    pub found: Value,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {:?}", self.expected, self.found)
    }
}

impl std::error::Error for DecodeError {}

/// Decode a `Value` into a field type, used by generated mutators.
///
/// # Errors
///
/// Returns `DecodeError` when the variant does not fit `T`.
pub fn decode<T: ValueType>(value: Value) -> Result<T, DecodeError> {
    match T::from_value(value.clone()) {
        Some(v) => Ok(v),
        None => Err(DecodeError {
            expected: std::any::type_name::<T>(),
            found: value,
        }),
    }
}

/// Accessor/mutator pair binding one column to one struct field.
pub struct FieldDef<E> {
    /// Column name as it appears in the table descriptor
    pub column: &'static str,
    /// Read the field's current value
    pub get: fn(&E) -> Value,
    /// Overwrite the field from a scanned value
    pub set: fn(&mut E, Value) -> Result<(), DecodeError>,
    /// Whether the field currently holds its type's zero state
    pub is_zero: fn(&E) -> bool,
}

impl<E> Clone for FieldDef<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for FieldDef<E> {}

impl<E> fmt::Debug for FieldDef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef").field("column", &self.column).finish()
    }
}

/// A struct mapped onto one table.
///
/// Normally implemented with `#[derive(Entity)]`; see the crate docs for the
/// attributes it understands.
pub trait Entity: Sized + 'static {
    /// Static table metadata
    const TABLE: TableDescriptor;

    /// One binding per column, in the same order as `TABLE.columns`
    const FIELDS: &'static [FieldDef<Self>];

    /// Position of a column's binding in `FIELDS`.
    fn field_index(column: &str) -> Option<usize> {
        Self::FIELDS.iter().position(|f| f.column == column)
    }

    /// The binding for a column, if the entity has one.
    fn field(column: &str) -> Option<&'static FieldDef<Self>> {
        Self::FIELDS.iter().find(|f| f.column == column)
    }

    /// Current primary-key values in key order.
    ///
    /// # Errors
    ///
    /// Returns `QuarryError::UnknownColumn` if a key column has no field binding.
    fn primary_key_values(&self) -> Result<Vec<Value>, QuarryError> {
        Self::TABLE
            .primary_key
            .iter()
            .map(|column| {
                Self::field(column)
                    .map(|field| (field.get)(self))
                    .ok_or_else(|| QuarryError::UnknownColumn {
                        table: Self::TABLE.name,
                        column: column.to_string(),
                    })
            })
            .collect()
    }
}
