//! Binding column names to entity fields.
//!
//! A [`FieldMapping`] is a list of positions into `E::FIELDS`, resolved once
//! when a plan is compiled. Extracting values or scanning a row back is then a
//! walk over those positions with no name lookups.

use crate::entity::Entity;
use crate::error::QuarryError;
use crate::executor::Row;
use sea_query::Value;

/// Ordered positions into an entity's field table.
///
/// A mapping is only meaningful for the entity type it was bound against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping(Vec<usize>);

impl FieldMapping {
    /// Resolve column names to field positions, keeping the given order.
    ///
    /// # Errors
    ///
    /// Returns `QuarryError::UnknownColumn` for the first name the entity has no
    /// field for.
    pub fn bind<E: Entity, S: AsRef<str>>(columns: &[S]) -> Result<Self, QuarryError> {
        columns
            .iter()
            .map(|column| {
                let column = column.as_ref();
                E::field_index(column).ok_or_else(|| QuarryError::UnknownColumn {
                    table: E::TABLE.name,
                    column: column.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(FieldMapping)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column names of the mapping, in mapping order.
    pub fn columns<E: Entity>(&self) -> Vec<&'static str> {
        self.0.iter().map(|&i| E::FIELDS[i].column).collect()
    }

    /// Read the current field values in mapping order.
    pub fn extract<E: Entity>(&self, record: &E) -> Vec<Value> {
        let mut values = Vec::with_capacity(self.0.len());
        self.extract_into(record, &mut values);
        values
    }

    /// Append the current field values to `out`, in mapping order.
    pub fn extract_into<E: Entity>(&self, record: &E, out: &mut Vec<Value>) {
        out.extend(self.0.iter().map(|&i| (E::FIELDS[i].get)(record)));
    }

    /// Targets for scanning a row back into `record`.
    pub fn targets<'a, E: Entity>(&'a self, record: &'a mut E) -> ReturnTargets<'a, E> {
        ReturnTargets {
            record,
            mapping: self,
        }
    }
}

/// Writable field targets over one record, in mapping order.
///
/// Scanning writes through to the record the targets were created from.
pub struct ReturnTargets<'a, E: Entity> {
    record: &'a mut E,
    mapping: &'a FieldMapping,
}

impl<E: Entity> ReturnTargets<'_, E> {
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Write `row[i]` into the i-th target field.
    ///
    /// Fields are written in order; on error the fields before the failing one
    /// have already been overwritten.
    ///
    /// # Errors
    ///
    /// Returns `QuarryError::Decode` if the row has the wrong number of values or
    /// a value does not fit its field.
    pub fn scan(self, row: Row) -> Result<(), QuarryError> {
        if row.len() != self.mapping.len() {
            return Err(QuarryError::Decode {
                table: E::TABLE.name,
                column: "*".to_string(),
                reason: format!(
                    "row has {} value(s), expected {}",
                    row.len(),
                    self.mapping.len()
                ),
            });
        }
        for (&i, value) in self.mapping.0.iter().zip(row) {
            let field = &E::FIELDS[i];
            (field.set)(self.record, value).map_err(|e| QuarryError::Decode {
                table: E::TABLE.name,
                column: field.column.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}
