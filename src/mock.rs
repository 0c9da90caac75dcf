//! Recording executor for tests.
//!
//! [`MockExecutor`] logs every statement with its parameters and answers from
//! queues of scripted results, in the style of a mock database connection:
//!
//! ```rust
//! use quarry::mock::MockExecutor;
//! use quarry::{Executor, Value};
//!
//! let mock = MockExecutor::new()
//!     .append_exec_results([1])
//!     .append_query_results([vec![vec![Value::Int(Some(7))]]]);
//!
//! assert_eq!(mock.execute("DELETE FROM \"roles\" WHERE \"id\"=$1", &[Value::Int(Some(7))]).unwrap(), 1);
//! let row = mock.query_opt("SELECT \"id\" FROM \"roles\" WHERE \"id\"=$1", &[Value::Int(Some(7))]).unwrap();
//! assert_eq!(row, Some(vec![Value::Int(Some(7))]));
//! assert_eq!(mock.statements().len(), 2);
//! ```
//!
//! `execute` consumes exec results and the query methods consume query results;
//! an error queued with [`MockExecutor::append_error`] is returned by whichever
//! call comes next. With nothing queued, `execute` reports 0 rows and queries
//! return no rows.

use crate::executor::{Executor, ExecutorError, Row};
use sea_query::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// One statement seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
struct Script {
    exec_results: VecDeque<u64>,
    query_results: VecDeque<Vec<Row>>,
    errors: VecDeque<String>,
    log: Vec<RecordedStatement>,
}

/// Scripted in-memory executor.
#[derive(Debug, Default)]
pub struct MockExecutor {
    script: Mutex<Script>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue affected-row counts for `execute`.
    #[must_use]
    pub fn append_exec_results(self, results: impl IntoIterator<Item = u64>) -> Self {
        self.lock().exec_results.extend(results);
        self
    }

    /// Queue result sets for `query_opt` / `query_all`; one set per call.
    #[must_use]
    pub fn append_query_results(self, results: impl IntoIterator<Item = Vec<Row>>) -> Self {
        self.lock().query_results.extend(results);
        self
    }

    /// Queue a failure for the next call of any kind.
    #[must_use]
    pub fn append_error(self, message: impl Into<String>) -> Self {
        self.lock().errors.push_back(message.into());
        self
    }

    /// Every statement executed so far, oldest first.
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.lock().log.clone()
    }

    /// The most recent statement.
    pub fn last_statement(&self) -> Option<RecordedStatement> {
        self.lock().log.last().cloned()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, query: &str, params: &[Value]) -> Result<(), ExecutorError> {
        let mut script = self.lock();
        script.log.push(RecordedStatement {
            sql: query.to_string(),
            params: params.to_vec(),
        });
        match script.errors.pop_front() {
            Some(message) => Err(ExecutorError::QueryError(message)),
            None => Ok(()),
        }
    }

    fn next_rows(&self) -> Vec<Row> {
        self.lock().query_results.pop_front().unwrap_or_default()
    }
}

impl Executor for MockExecutor {
    fn execute(&self, query: &str, params: &[Value]) -> Result<u64, ExecutorError> {
        self.record(query, params)?;
        Ok(self.lock().exec_results.pop_front().unwrap_or(0))
    }

    fn query_opt(&self, query: &str, params: &[Value]) -> Result<Option<Row>, ExecutorError> {
        self.record(query, params)?;
        Ok(self.next_rows().into_iter().next())
    }

    fn query_all(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        self.record(query, params)?;
        Ok(self.next_rows())
    }
}
