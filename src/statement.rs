//! SQL text assembly for PostgreSQL.
//!
//! Statements are compiled once per cache key and then reused with fresh values,
//! so they are built as plain text templates with positional `$n` placeholders
//! rather than through a value-carrying query builder. Identifiers are always
//! double-quoted; a dotted table name is quoted per segment
//! (`public.roles` → `"public"."roles"`).

use crate::error::QuarryError;
use crate::schema::TableDescriptor;
use std::fmt::Write;

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    push_ident(&mut out, name);
    out
}

fn push_ident(out: &mut String, name: &str) {
    for (i, part) in name.split('.').enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push('"');
        out.push_str(&part.replace('"', "\"\""));
        out.push('"');
    }
}

fn push_column_list<S: AsRef<str>>(out: &mut String, columns: &[S]) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_ident(out, column.as_ref());
    }
}

/// Append `$start,$start+1,…` for `count` placeholders.
fn push_placeholders(out: &mut String, start: usize, count: usize) {
    for n in start..start + count {
        if n > start {
            out.push(',');
        }
        let _ = write!(out, "${n}");
    }
}

/// Append `"a"=$n AND "b"=$n+1` and return the next free placeholder.
fn push_key_match(out: &mut String, key: &[&str], start: usize) -> usize {
    for (i, column) in key.iter().enumerate() {
        if i > 0 {
            out.push_str(" AND ");
        }
        push_ident(out, column);
        let _ = write!(out, "=${}", start + i);
    }
    start + key.len()
}

/// Append `("a","b") IN (($1,$2),($3,$4))` for `rows` keys.
///
/// Single-column keys are not wrapped per row: `("id") IN ($1,$2)`.
fn push_key_in(out: &mut String, key: &[&str], rows: usize, start: usize) -> usize {
    out.push('(');
    push_column_list(out, key);
    out.push_str(") IN (");
    let mut next = start;
    for row in 0..rows {
        if row > 0 {
            out.push(',');
        }
        if key.len() == 1 {
            let _ = write!(out, "${next}");
        } else {
            out.push('(');
            push_placeholders(out, next, key.len());
            out.push(')');
        }
        next += key.len();
    }
    out.push(')');
    next
}

fn push_returning<S: AsRef<str>>(out: &mut String, returning: &[S]) {
    if !returning.is_empty() {
        out.push_str(" RETURNING ");
        push_column_list(out, returning);
    }
}

/// `INSERT INTO t ("a","b") VALUES ($1,$2)`, plus `RETURNING` when needed.
pub fn insert<S: AsRef<str>>(table: &TableDescriptor, columns: &[S], returning: &[S]) -> String {
    let mut sql = String::with_capacity(64);
    sql.push_str("INSERT INTO ");
    push_ident(&mut sql, table.name);
    sql.push_str(" (");
    push_column_list(&mut sql, columns);
    sql.push_str(") VALUES (");
    push_placeholders(&mut sql, 1, columns.len());
    sql.push(')');
    push_returning(&mut sql, returning);
    sql
}

/// `UPDATE t SET "a"=$1 WHERE "id"=$2`.
///
/// Key placeholders continue the numbering of the SET clause.
pub fn update<S: AsRef<str>>(table: &TableDescriptor, set: &[S]) -> String {
    let mut sql = String::with_capacity(64);
    sql.push_str("UPDATE ");
    push_ident(&mut sql, table.name);
    sql.push_str(" SET ");
    push_assignments(&mut sql, set);
    sql.push_str(" WHERE ");
    push_key_match(&mut sql, table.primary_key, set.len() + 1);
    sql
}

fn push_assignments<S: AsRef<str>>(out: &mut String, set: &[S]) {
    for (i, column) in set.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_ident(out, column.as_ref());
        let _ = write!(out, "=${}", i + 1);
    }
}

/// Options deciding the conflict clause of an upsert.
#[derive(Debug, Clone, Copy)]
pub struct ConflictClause<'a, S> {
    /// Conflict target; empty means the primary key
    pub target: &'a [S],
    /// `DO UPDATE` when true, `DO NOTHING` otherwise
    pub update_on_conflict: bool,
    /// Columns overwritten from `EXCLUDED` on the update path
    pub update: &'a [S],
}

/// `INSERT … ON CONFLICT ("id") DO NOTHING` or `… DO UPDATE SET "a"=EXCLUDED."a"`.
///
/// # Errors
///
/// Returns `QuarryError::EmptyUpdateSet` when the update path has no columns.
pub fn upsert<S: AsRef<str>>(
    table: &TableDescriptor,
    columns: &[S],
    conflict: ConflictClause<'_, S>,
    returning: &[S],
) -> Result<String, QuarryError> {
    if conflict.update_on_conflict && conflict.update.is_empty() {
        return Err(QuarryError::EmptyUpdateSet { table: table.name });
    }

    let mut sql = String::with_capacity(128);
    sql.push_str("INSERT INTO ");
    push_ident(&mut sql, table.name);
    sql.push_str(" (");
    push_column_list(&mut sql, columns);
    sql.push_str(") VALUES (");
    push_placeholders(&mut sql, 1, columns.len());
    sql.push_str(") ON CONFLICT (");
    if conflict.target.is_empty() {
        push_column_list(&mut sql, table.primary_key);
    } else {
        push_column_list(&mut sql, conflict.target);
    }
    sql.push(')');

    if conflict.update_on_conflict {
        sql.push_str(" DO UPDATE SET ");
        for (i, column) in conflict.update.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            let quoted = quote_ident(column.as_ref());
            let _ = write!(sql, "{quoted}=EXCLUDED.{quoted}");
        }
    } else {
        sql.push_str(" DO NOTHING");
    }
    push_returning(&mut sql, returning);
    Ok(sql)
}

/// `DELETE FROM t WHERE "id"=$1`.
pub fn delete(table: &TableDescriptor) -> String {
    let mut sql = String::from("DELETE FROM ");
    push_ident(&mut sql, table.name);
    sql.push_str(" WHERE ");
    push_key_match(&mut sql, table.primary_key, 1);
    sql
}

/// `SELECT EXISTS(SELECT 1 FROM t WHERE "id"=$1 LIMIT 1)`.
pub fn exists(table: &TableDescriptor) -> String {
    let mut sql = String::from("SELECT EXISTS(SELECT 1 FROM ");
    push_ident(&mut sql, table.name);
    sql.push_str(" WHERE ");
    push_key_match(&mut sql, table.primary_key, 1);
    sql.push_str(" LIMIT 1)");
    sql
}

/// `SELECT "a","b" FROM t WHERE "id"=$1`.
pub fn select_by_key<S: AsRef<str>>(table: &TableDescriptor, columns: &[S]) -> String {
    let mut sql = String::from("SELECT ");
    push_column_list(&mut sql, columns);
    sql.push_str(" FROM ");
    push_ident(&mut sql, table.name);
    sql.push_str(" WHERE ");
    push_key_match(&mut sql, table.primary_key, 1);
    sql
}

/// `DELETE FROM t WHERE ("id") IN ($1,$2,…)` for `rows` keys.
pub fn delete_all(table: &TableDescriptor, rows: usize) -> String {
    let mut sql = String::from("DELETE FROM ");
    push_ident(&mut sql, table.name);
    sql.push_str(" WHERE ");
    push_key_in(&mut sql, table.primary_key, rows, 1);
    sql
}

/// `SELECT "a","b" FROM t WHERE ("id") IN ($1,$2,…)` for `rows` keys.
pub fn select_all_by_keys<S: AsRef<str>>(
    table: &TableDescriptor,
    columns: &[S],
    rows: usize,
) -> String {
    let mut sql = String::from("SELECT ");
    push_column_list(&mut sql, columns);
    sql.push_str(" FROM ");
    push_ident(&mut sql, table.name);
    sql.push_str(" WHERE ");
    push_key_in(&mut sql, table.primary_key, rows, 1);
    sql
}

/// `UPDATE t SET "a"=$1 WHERE ("id") IN ($2,$3,…)` for `rows` keys.
pub fn update_all<S: AsRef<str>>(table: &TableDescriptor, set: &[S], rows: usize) -> String {
    let mut sql = String::from("UPDATE ");
    push_ident(&mut sql, table.name);
    sql.push_str(" SET ");
    push_assignments(&mut sql, set);
    sql.push_str(" WHERE ");
    push_key_in(&mut sql, table.primary_key, rows, set.len() + 1);
    sql
}

/// `SELECT COUNT(*) FROM t`.
pub fn count(table: &TableDescriptor) -> String {
    let mut sql = String::from("SELECT COUNT(*) FROM ");
    push_ident(&mut sql, table.name);
    sql
}
