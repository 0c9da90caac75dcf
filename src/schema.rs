//! Static table metadata.
//!
//! A [`TableDescriptor`] is created once per entity type (normally by
//! `#[derive(Entity)]`) and never mutated. It is the only schema knowledge the
//! engine has; nothing is read from a live catalog.

use crate::error::QuarryError;

/// Table-level metadata consumed by the column resolver and statement builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    /// Table name, optionally schema-qualified (`"public.roles"`)
    pub name: &'static str,
    /// All columns in table order
    pub columns: &'static [&'static str],
    /// Columns the database can fill in on its own
    pub columns_with_default: &'static [&'static str],
    /// Columns that must always be supplied
    pub columns_without_default: &'static [&'static str],
    /// Primary-key columns in key order
    pub primary_key: &'static [&'static str],
    /// Column stamped on insert when still zero
    pub created_at: Option<&'static str>,
    /// Column stamped on every write
    pub updated_at: Option<&'static str>,
}

impl TableDescriptor {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }

    pub fn has_default(&self, column: &str) -> bool {
        self.columns_with_default.contains(&column)
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.contains(&column)
    }

    /// Check the descriptor's invariants.
    ///
    /// Default and no-default columns must be disjoint and together cover every
    /// column; the primary key must be non-empty and made of known columns, as must
    /// the timestamp columns.
    ///
    /// # Errors
    ///
    /// Returns `QuarryError::InvalidDescriptor` naming the first violation found.
    pub fn validate(&self) -> Result<(), QuarryError> {
        let invalid = |reason: String| QuarryError::InvalidDescriptor {
            table: self.name,
            reason,
        };

        if self.columns.is_empty() {
            return Err(invalid("table has no columns".to_string()));
        }
        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i].contains(column) {
                return Err(invalid(format!("column {column:?} is listed twice")));
            }
        }
        for column in self.columns_with_default {
            if self.columns_without_default.contains(column) {
                return Err(invalid(format!(
                    "column {column:?} is both defaulted and not defaulted"
                )));
            }
        }
        for column in self.columns {
            if !self.columns_with_default.contains(column)
                && !self.columns_without_default.contains(column)
            {
                return Err(invalid(format!(
                    "column {column:?} is neither defaulted nor not defaulted"
                )));
            }
        }
        for column in self
            .columns_with_default
            .iter()
            .chain(self.columns_without_default)
        {
            if !self.has_column(column) {
                return Err(invalid(format!("unknown column {column:?}")));
            }
        }
        if self.primary_key.is_empty() {
            return Err(invalid("primary key is empty".to_string()));
        }
        for column in self.primary_key {
            if !self.has_column(column) {
                return Err(invalid(format!("primary key column {column:?} is unknown")));
            }
        }
        for column in self.created_at.iter().chain(self.updated_at.iter()) {
            if !self.has_column(column) {
                return Err(invalid(format!("timestamp column {column:?} is unknown")));
            }
        }
        Ok(())
    }
}
