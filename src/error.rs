//! Error types for engine and façade operations.
//!
//! Every failure is returned to the caller as a [`QuarryError`]; nothing in the
//! engine panics. Executor failures keep their original cause reachable through
//! [`std::error::Error::source`].

use crate::executor::ExecutorError;
use std::fmt;

/// The façade operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Upsert,
    Delete,
    Find,
    Exists,
    Reload,
    DeleteAll,
    ReloadAll,
    UpdateAll,
    Count,
}

impl Operation {
    /// Lower-case name used in error messages, log lines and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
            Operation::Find => "find",
            Operation::Exists => "exists",
            Operation::Reload => "reload",
            Operation::DeleteAll => "delete_all",
            Operation::ReloadAll => "reload_all",
            Operation::UpdateAll => "update_all",
            Operation::Count => "count",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for engine and façade operations
#[derive(Debug)]
pub enum QuarryError {
    /// The operation was invoked without a record; the executor is never reached
    NilInstance {
        op: Operation,
        table: &'static str,
    },
    /// Column resolution left nothing to write
    EmptyColumnSet {
        op: Operation,
        table: &'static str,
    },
    /// An `ON CONFLICT DO UPDATE` upsert resolved to an empty update list
    EmptyUpdateSet { table: &'static str },
    /// A requested column has no field on the entity
    UnknownColumn { table: &'static str, column: String },
    /// A by-key lookup matched zero rows
    NotFound { table: &'static str },
    /// The executor failed
    ExecutionFailed {
        op: Operation,
        table: &'static str,
        source: ExecutorError,
    },
    /// A scanned value does not fit the field it is written to
    Decode {
        table: &'static str,
        column: String,
        reason: String,
    },
    /// A primary-key lookup was given the wrong number of key values
    KeyMismatch {
        table: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Table metadata violates its own invariants
    InvalidDescriptor { table: &'static str, reason: String },
}

impl QuarryError {
    /// Whether this error means "the row does not exist" rather than "the operation failed".
    pub fn is_not_found(&self) -> bool {
        matches!(self, QuarryError::NotFound { .. })
    }

    pub(crate) fn execution(op: Operation, table: &'static str, source: ExecutorError) -> Self {
        QuarryError::ExecutionFailed { op, table, source }
    }
}

impl fmt::Display for QuarryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuarryError::NilInstance { op, table } => {
                write!(f, "quarry: no {table} record provided for {op}")
            }
            QuarryError::EmptyColumnSet { op, table } => {
                write!(f, "quarry: unable to {op} {table}, could not build column list")
            }
            QuarryError::EmptyUpdateSet { table } => {
                write!(f, "quarry: unable to upsert {table}, could not build update column list")
            }
            QuarryError::UnknownColumn { table, column } => {
                write!(f, "quarry: {table} has no field for column {column:?}")
            }
            QuarryError::NotFound { table } => write!(f, "quarry: no {table} row found"),
            QuarryError::ExecutionFailed { op, table, source } => {
                write!(f, "quarry: unable to {op} {table}: {source}")
            }
            QuarryError::Decode {
                table,
                column,
                reason,
            } => write!(f, "quarry: unable to decode {table}.{column}: {reason}"),
            QuarryError::KeyMismatch {
                table,
                expected,
                actual,
            } => write!(
                f,
                "quarry: {table} primary key has {expected} column(s), got {actual} value(s)"
            ),
            QuarryError::InvalidDescriptor { table, reason } => {
                write!(f, "quarry: invalid table descriptor for {table}: {reason}")
            }
        }
    }
}

impl std::error::Error for QuarryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QuarryError::ExecutionFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
