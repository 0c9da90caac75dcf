//! Cache keys for compiled statement plans.
//!
//! A key encodes the variable inputs of one write: an operation-mode byte, then
//! each column group in a fixed order. Columns are kept in the order the caller
//! supplied them, because that order is the order of the generated column lists.
//! `["a", "b"]` and `["b", "a"]` therefore compile to different SQL and get
//! different keys.
//!
//! Column names are separated by a unit separator (`0x1F`) and groups by a
//! record separator (`0x1E`). Neither byte can appear in a sane identifier, so
//! `["ab"]` and `["a", "b"]`, or a column moving from one group to the next,
//! never produce the same key.

use std::fmt;

const COLUMN_SEP: char = '\u{1f}';
const GROUP_SEP: char = '\u{1e}';

/// Key into a [`StatementCache`](crate::cache::StatementCache).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for an INSERT: whitelist, then the non-zero defaultable columns.
    pub fn insert(whitelist: &[&str], non_zero_defaults: &[&str]) -> Self {
        Self::build('i', &[whitelist, non_zero_defaults])
    }

    /// Key for an UPDATE: the whitelist alone decides the statement.
    pub fn update(whitelist: &[&str]) -> Self {
        Self::build('u', &[whitelist])
    }

    /// Key for an upsert.
    ///
    /// The mode byte records whether the conflict path updates (`t`) or does
    /// nothing (`f`).
    pub fn upsert(
        update_on_conflict: bool,
        conflict: &[&str],
        update: &[&str],
        whitelist: &[&str],
        non_zero_defaults: &[&str],
    ) -> Self {
        let mode = if update_on_conflict { 't' } else { 'f' };
        Self::build(mode, &[conflict, update, whitelist, non_zero_defaults])
    }

    fn build(mode: char, groups: &[&[&str]]) -> Self {
        let capacity = 1 + groups
            .iter()
            .map(|g| 1 + g.iter().map(|c| c.len() + 1).sum::<usize>())
            .sum::<usize>();
        let mut key = String::with_capacity(capacity);
        key.push(mode);
        for group in groups {
            key.push(GROUP_SEP);
            for (i, column) in group.iter().enumerate() {
                if i > 0 {
                    key.push(COLUMN_SEP);
                }
                key.push_str(column);
            }
        }
        CacheKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    /// Readable form for logs: separators shown as `,` and `|`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                COLUMN_SEP => f.write_str(",")?,
                GROUP_SEP => f.write_str("|")?,
                c => write!(f, "{c}")?,
            }
        }
        Ok(())
    }
}
