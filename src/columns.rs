//! Column set resolution for inserts and updates.
//!
//! These are pure functions of the table metadata, the caller's whitelist and
//! (for inserts) the defaultable columns the caller has set.

use crate::error::{Operation, QuarryError};
use crate::schema::TableDescriptor;

/// Columns an INSERT writes, and the columns it must read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertColumns {
    /// Columns bound as values, in statement order
    pub insert: Vec<String>,
    /// Defaultable columns the database generates, in table order
    pub returning: Vec<String>,
}

/// Resolve the columns of an INSERT.
///
/// With a whitelist, exactly the whitelisted columns are written and every
/// defaultable column outside it is returned. Without one, every column lacking a
/// default is written plus the defaultable columns listed in `non_zero_defaults`
/// (kept in table order), and the remaining defaultable columns are returned.
///
/// An empty `insert` set is returned as-is; rejecting it is the caller's job.
pub fn insert_column_set(
    table: &TableDescriptor,
    non_zero_defaults: &[&str],
    whitelist: &[&str],
) -> InsertColumns {
    if !whitelist.is_empty() {
        return InsertColumns {
            insert: whitelist.iter().map(|c| c.to_string()).collect(),
            returning: complement(table.columns_with_default, whitelist),
        };
    }

    let insert: Vec<String> = table
        .columns
        .iter()
        .filter(|c| !table.has_default(c) || non_zero_defaults.contains(c))
        .map(|c| c.to_string())
        .collect();
    let returning = table
        .columns_with_default
        .iter()
        .filter(|c| !non_zero_defaults.contains(c))
        .map(|c| c.to_string())
        .collect();

    InsertColumns { insert, returning }
}

/// Resolve the SET columns of an UPDATE.
///
/// A whitelist is used in caller order; otherwise every column is a candidate.
/// Primary-key columns are dropped either way, since a row is addressed by its
/// key and rewriting the key to itself updates nothing.
///
/// # Errors
///
/// Returns `QuarryError::EmptyColumnSet` when nothing is left to update.
pub fn update_column_set(
    table: &TableDescriptor,
    whitelist: &[&str],
) -> Result<Vec<String>, QuarryError> {
    let candidates = if whitelist.is_empty() {
        table.columns
    } else {
        whitelist
    };
    let columns: Vec<String> = candidates
        .iter()
        .filter(|c| !table.is_primary_key(c))
        .map(|c| c.to_string())
        .collect();

    if columns.is_empty() {
        return Err(QuarryError::EmptyColumnSet {
            op: Operation::Update,
            table: table.name,
        });
    }
    Ok(columns)
}

fn complement(set: &[&str], remove: &[&str]) -> Vec<String> {
    set.iter()
        .filter(|c| !remove.contains(c))
        .map(|c| c.to_string())
        .collect()
}
