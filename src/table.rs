//! The per-entity CRUD façade.
//!
//! A [`Table<E>`] owns the statement caches for one entity type and runs every
//! operation against a caller-supplied [`Executor`]. Writes go through the cache:
//!
//! ```text
//! cache key → cache lookup (miss: resolve columns, build SQL, bind fields, store)
//!           → extract values from the record → execute → scan RETURNING back
//! ```
//!
//! Operations that take a record accept `Option<&mut E>` (or a plain `&mut E`);
//! passing `None` fails with [`QuarryError::NilInstance`] before any SQL is built.
//!
//! ```rust
//! use quarry::mock::MockExecutor;
//! use quarry::{Entity, Table, Value};
//!
//! #[derive(Debug, Default, Entity)]
//! #[table_name = "roles"]
//! struct Role {
//!     #[primary_key]
//!     #[has_default]
//!     id: i32,
//!     name: String,
//! }
//!
//! let roles = Table::<Role>::new();
//! let db = MockExecutor::new().append_query_results([vec![vec![Value::Int(Some(1))]]]);
//!
//! let mut role = Role { name: "admin".into(), ..Default::default() };
//! roles.insert(&db, &mut role, &[]).unwrap();
//! assert_eq!(role.id, 1);
//! assert_eq!(
//!     db.last_statement().unwrap().sql,
//!     "INSERT INTO \"roles\" (\"name\") VALUES ($1) RETURNING \"id\""
//! );
//! ```

use crate::cache::{CompiledPlan, StatementCache};
use crate::cache_key::CacheKey;
use crate::columns::{insert_column_set, update_column_set};
use crate::config::EngineConfig;
use crate::entity::Entity;
use crate::error::{Operation, QuarryError};
use crate::executor::{Executor, ExecutorError, Row};
use crate::mapping::FieldMapping;
use crate::statement::{self, ConflictClause};
use crate::value::ValueType;
use chrono::{DateTime, Utc};
use sea_query::Value;
use std::fmt;
use std::marker::PhantomData;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Conflict handling for [`Table::upsert`].
///
/// ```rust
/// use quarry::UpsertOptions;
///
/// let opts = UpsertOptions::do_update()
///     .conflict(&["email"])
///     .update(&["name", "updated_at"]);
/// assert!(opts.update_on_conflict);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct UpsertOptions<'a> {
    /// `DO UPDATE` on conflict when true, `DO NOTHING` otherwise
    pub update_on_conflict: bool,
    /// Conflict target; empty means the primary key
    pub conflict: &'a [&'a str],
    /// Columns overwritten on conflict; empty means every non-key column
    pub update: &'a [&'a str],
    /// Columns inserted; empty means inferred as for [`Table::insert`]
    pub whitelist: &'a [&'a str],
}

impl<'a> UpsertOptions<'a> {
    pub fn do_update() -> Self {
        Self {
            update_on_conflict: true,
            conflict: &[],
            update: &[],
            whitelist: &[],
        }
    }

    pub fn do_nothing() -> Self {
        Self {
            update_on_conflict: false,
            ..Self::do_update()
        }
    }

    #[must_use]
    pub fn conflict(mut self, columns: &'a [&'a str]) -> Self {
        self.conflict = columns;
        self
    }

    #[must_use]
    pub fn update(mut self, columns: &'a [&'a str]) -> Self {
        self.update = columns;
        self
    }

    #[must_use]
    pub fn whitelist(mut self, columns: &'a [&'a str]) -> Self {
        self.whitelist = columns;
        self
    }
}

impl Default for UpsertOptions<'_> {
    fn default() -> Self {
        Self::do_update()
    }
}

/// Statements that only depend on the table, built once per `Table`.
struct KeyStatements {
    delete: String,
    exists: String,
    select: String,
    count: String,
}

/// CRUD operations and statement caches for one entity type.
pub struct Table<E: Entity> {
    insert_cache: StatementCache,
    update_cache: StatementCache,
    upsert_cache: StatementCache,
    statements: KeyStatements,
    config: EngineConfig,
    clock: fn() -> DateTime<Utc>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for Table<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for Table<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("table", &E::TABLE.name)
            .field("insert_plans", &self.insert_cache.len())
            .field("update_plans", &self.update_cache.len())
            .field("upsert_plans", &self.upsert_cache.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<E: Entity> Table<E> {
    /// Create a table façade with empty caches and the default engine settings.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let table = &E::TABLE;
        let threshold = config.plan_cache_warn_threshold;
        Self {
            insert_cache: StatementCache::new(table.name, Operation::Insert, threshold),
            update_cache: StatementCache::new(table.name, Operation::Update, threshold),
            upsert_cache: StatementCache::new(table.name, Operation::Upsert, threshold),
            statements: KeyStatements {
                delete: statement::delete(table),
                exists: statement::exists(table),
                select: statement::select_by_key(table, table.columns),
                count: statement::count(table),
            },
            config,
            clock: Utc::now,
            _entity: PhantomData,
        }
    }

    /// Replace the time source used for `created_at`/`updated_at` stamping.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn insert_cache(&self) -> &StatementCache {
        &self.insert_cache
    }

    pub fn update_cache(&self) -> &StatementCache {
        &self.update_cache
    }

    pub fn upsert_cache(&self) -> &StatementCache {
        &self.upsert_cache
    }

    /// Drop every cached write plan, e.g. after a schema change.
    pub fn clear_caches(&self) {
        self.insert_cache.clear();
        self.update_cache.clear();
        self.upsert_cache.clear();
        log::debug!("{} plan caches cleared", E::TABLE.name);
    }

    /// Check the table descriptor and that every column has exactly one field binding.
    ///
    /// # Errors
    ///
    /// Returns `QuarryError::InvalidDescriptor` or `QuarryError::UnknownColumn`.
    pub fn validate() -> Result<(), QuarryError> {
        E::TABLE.validate()?;
        for column in E::TABLE.columns {
            if E::field(column).is_none() {
                return Err(QuarryError::UnknownColumn {
                    table: E::TABLE.name,
                    column: column.to_string(),
                });
            }
        }
        if E::FIELDS.len() != E::TABLE.columns.len() {
            return Err(QuarryError::InvalidDescriptor {
                table: E::TABLE.name,
                reason: format!(
                    "entity binds {} field(s) for {} column(s)",
                    E::FIELDS.len(),
                    E::TABLE.columns.len()
                ),
            });
        }
        Ok(())
    }

    /// Insert a record.
    ///
    /// Zero-valued `created_at`/`updated_at` columns are stamped first. With an
    /// empty whitelist the inserted columns are inferred: every column without a
    /// default, plus defaultable columns the record holds a non-zero value for.
    /// Defaultable columns left out are read back with `RETURNING`.
    ///
    /// # Errors
    ///
    /// - `NilInstance` if `record` is `None`
    /// - `EmptyColumnSet` if nothing would be inserted
    /// - `UnknownColumn` if the whitelist names a column the entity lacks
    /// - `ExecutionFailed` if the executor fails
    /// - `Decode` if a returned value does not fit its field
    pub fn insert<'r, X>(
        &self,
        exec: &X,
        record: impl Into<Option<&'r mut E>>,
        whitelist: &[&str],
    ) -> Result<(), QuarryError>
    where
        X: Executor + ?Sized,
    {
        let op = Operation::Insert;
        let record = require(op, record.into())?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(E::TABLE.name, op).entered();

        let now = (self.clock)();
        if let Some(column) = E::TABLE.created_at {
            stamp(record, column, now, true)?;
        }
        if let Some(column) = E::TABLE.updated_at {
            stamp(record, column, now, true)?;
        }

        let non_zero = non_zero_defaults(record);
        let key = CacheKey::insert(whitelist, &non_zero);
        let (plan, _) = self.insert_cache.get_or_compile(key, || {
            let columns = insert_column_set(&E::TABLE, &non_zero, whitelist);
            if columns.insert.is_empty() {
                return Err(QuarryError::EmptyColumnSet {
                    op,
                    table: E::TABLE.name,
                });
            }
            Ok(CompiledPlan {
                sql: statement::insert(&E::TABLE, &columns.insert, &columns.returning),
                values: FieldMapping::bind::<E, _>(&columns.insert)?,
                returning: FieldMapping::bind::<E, _>(&columns.returning)?,
            })
        })?;

        let values = plan.values.extract(record);
        if plan.returning.is_empty() {
            self.run(op, &plan.sql, &values, || exec.execute(&plan.sql, &values))?;
            return Ok(());
        }

        let row = self.run(op, &plan.sql, &values, || {
            exec.query_opt(&plan.sql, &values)?
                .ok_or_else(|| ExecutorError::QueryError("INSERT ... RETURNING produced no row".to_string()))
        })?;
        plan.returning.targets(record).scan(row)
    }

    /// Update a record by primary key, returning the number of rows affected.
    ///
    /// `updated_at` is stamped unconditionally. With an empty whitelist every
    /// non-key column is written. Generated values are not read back; call
    /// [`reload`](Self::reload) for that.
    ///
    /// # Errors
    ///
    /// - `NilInstance` if `record` is `None`
    /// - `EmptyColumnSet` if the whitelist leaves nothing to update
    /// - `UnknownColumn` if the whitelist names a column the entity lacks
    /// - `ExecutionFailed` if the executor fails
    pub fn update<'r, X>(
        &self,
        exec: &X,
        record: impl Into<Option<&'r mut E>>,
        whitelist: &[&str],
    ) -> Result<u64, QuarryError>
    where
        X: Executor + ?Sized,
    {
        let op = Operation::Update;
        let record = require(op, record.into())?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(E::TABLE.name, op).entered();

        if let Some(column) = E::TABLE.updated_at {
            stamp(record, column, (self.clock)(), false)?;
        }

        let (plan, _) = self
            .update_cache
            .get_or_compile(CacheKey::update(whitelist), || {
                let set = update_column_set(&E::TABLE, whitelist)?;
                let bound: Vec<&str> = set
                    .iter()
                    .map(String::as_str)
                    .chain(E::TABLE.primary_key.iter().copied())
                    .collect();
                Ok(CompiledPlan {
                    sql: statement::update(&E::TABLE, &set),
                    values: FieldMapping::bind::<E, _>(&bound)?,
                    returning: FieldMapping::default(),
                })
            })?;

        let values = plan.values.extract(record);
        self.run(op, &plan.sql, &values, || exec.execute(&plan.sql, &values))
    }

    /// Insert a record, or resolve a conflict on an existing row.
    ///
    /// `created_at` is stamped if zero and `updated_at` unconditionally. On the
    /// `DO NOTHING` path PostgreSQL returns no row for a conflicting insert; that
    /// is a success and the record is left as it was.
    ///
    /// # Errors
    ///
    /// - `NilInstance` if `record` is `None`
    /// - `EmptyColumnSet` if nothing would be inserted
    /// - `EmptyUpdateSet` if `update_on_conflict` is set but no column can be updated
    /// - `UnknownColumn` if an option names a column the entity lacks
    /// - `ExecutionFailed` if the executor fails
    /// - `Decode` if a returned value does not fit its field
    pub fn upsert<'r, X>(
        &self,
        exec: &X,
        record: impl Into<Option<&'r mut E>>,
        opts: &UpsertOptions<'_>,
    ) -> Result<(), QuarryError>
    where
        X: Executor + ?Sized,
    {
        let op = Operation::Upsert;
        let record = require(op, record.into())?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(E::TABLE.name, op).entered();

        let now = (self.clock)();
        if let Some(column) = E::TABLE.created_at {
            stamp(record, column, now, true)?;
        }
        if let Some(column) = E::TABLE.updated_at {
            stamp(record, column, now, false)?;
        }

        let non_zero = non_zero_defaults(record);
        // The update list only shapes the DO UPDATE path.
        let update: &[&str] = if opts.update_on_conflict { opts.update } else { &[] };
        let key = CacheKey::upsert(
            opts.update_on_conflict,
            opts.conflict,
            update,
            opts.whitelist,
            &non_zero,
        );
        let (plan, _) = self.upsert_cache.get_or_compile(key, || {
            if let Some(column) = opts
                .conflict
                .iter()
                .chain(update)
                .find(|c| !E::TABLE.has_column(c))
            {
                return Err(QuarryError::UnknownColumn {
                    table: E::TABLE.name,
                    column: column.to_string(),
                });
            }
            let columns = insert_column_set(&E::TABLE, &non_zero, opts.whitelist);
            if columns.insert.is_empty() {
                return Err(QuarryError::EmptyColumnSet {
                    op,
                    table: E::TABLE.name,
                });
            }
            let update = if opts.update_on_conflict {
                update_column_set(&E::TABLE, update).unwrap_or_default()
            } else {
                Vec::new()
            };
            let conflict: Vec<String> = opts.conflict.iter().map(|c| c.to_string()).collect();
            let sql = statement::upsert(
                &E::TABLE,
                &columns.insert,
                ConflictClause {
                    target: conflict.as_slice(),
                    update_on_conflict: opts.update_on_conflict,
                    update: update.as_slice(),
                },
                &columns.returning,
            )?;
            Ok(CompiledPlan {
                sql,
                values: FieldMapping::bind::<E, _>(&columns.insert)?,
                returning: FieldMapping::bind::<E, _>(&columns.returning)?,
            })
        })?;

        let values = plan.values.extract(record);
        if plan.returning.is_empty() {
            self.run(op, &plan.sql, &values, || exec.execute(&plan.sql, &values))?;
            return Ok(());
        }

        match self.run(op, &plan.sql, &values, || exec.query_opt(&plan.sql, &values))? {
            Some(row) => plan.returning.targets(record).scan(row),
            None => Ok(()),
        }
    }

    /// Delete a record by primary key, returning the number of rows affected.
    ///
    /// # Errors
    ///
    /// - `NilInstance` if `record` is `None`
    /// - `UnknownColumn` if a key column has no field binding
    /// - `ExecutionFailed` if the executor fails
    pub fn delete<'r, X>(&self, exec: &X, record: impl Into<Option<&'r E>>) -> Result<u64, QuarryError>
    where
        X: Executor + ?Sized,
    {
        let op = Operation::Delete;
        let record = record.into().ok_or(QuarryError::NilInstance {
            op,
            table: E::TABLE.name,
        })?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(E::TABLE.name, op).entered();

        let sql = &self.statements.delete;
        let key = record.primary_key_values()?;
        self.run(op, sql, &key, || exec.execute(sql, &key))
    }

    /// Whether a row with the given primary key exists.
    ///
    /// # Errors
    ///
    /// - `KeyMismatch` if `key` has the wrong number of values
    /// - `ExecutionFailed` if the executor fails
    /// - `Decode` if the result is not a boolean
    pub fn exists<X>(&self, exec: &X, key: &[Value]) -> Result<bool, QuarryError>
    where
        X: Executor + ?Sized,
    {
        let op = Operation::Exists;
        check_key::<E>(key)?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(E::TABLE.name, op).entered();

        let sql = &self.statements.exists;
        let row = self.run(op, sql, key, || exec.query_opt(sql, key))?;
        match row.and_then(|row| row.into_iter().next()) {
            Some(Value::Bool(Some(found))) => Ok(found),
            other => Err(QuarryError::Decode {
                table: E::TABLE.name,
                column: "exists".to_string(),
                reason: format!("expected a boolean, found {other:?}"),
            }),
        }
    }

    /// Count the rows of the table.
    ///
    /// # Errors
    ///
    /// - `ExecutionFailed` if the executor fails
    /// - `Decode` if the result is not an integer
    pub fn count<X>(&self, exec: &X) -> Result<i64, QuarryError>
    where
        X: Executor + ?Sized,
    {
        let op = Operation::Count;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(E::TABLE.name, op).entered();

        let sql = &self.statements.count;
        let row = self.run(op, sql, &[], || exec.query_opt(sql, &[]))?;
        let value = row.and_then(|row| row.into_iter().next());
        match value.clone().and_then(i64::from_value) {
            Some(n) => Ok(n),
            None => Err(QuarryError::Decode {
                table: E::TABLE.name,
                column: "count".to_string(),
                reason: format!("expected an integer, found {value:?}"),
            }),
        }
    }

    /// Update many records by primary key in one statement.
    ///
    /// Every row gets the same `assignments`; values are bound before the keys.
    /// An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// - `EmptyColumnSet` if `assignments` is empty
    /// - `UnknownColumn` if an assignment names a column the table lacks
    /// - `ExecutionFailed` if the executor fails
    pub fn update_all<X>(
        &self,
        exec: &X,
        records: &[E],
        assignments: &[(&str, Value)],
    ) -> Result<u64, QuarryError>
    where
        X: Executor + ?Sized,
    {
        let op = Operation::UpdateAll;
        if assignments.is_empty() {
            return Err(QuarryError::EmptyColumnSet {
                op,
                table: E::TABLE.name,
            });
        }
        if let Some((column, _)) = assignments.iter().find(|(c, _)| !E::TABLE.has_column(c)) {
            return Err(QuarryError::UnknownColumn {
                table: E::TABLE.name,
                column: column.to_string(),
            });
        }
        if records.is_empty() {
            return Ok(0);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(E::TABLE.name, op).entered();

        let columns: Vec<&str> = assignments.iter().map(|(c, _)| *c).collect();
        let sql = statement::update_all(&E::TABLE, &columns, records.len());
        let mut values: Vec<Value> = assignments.iter().map(|(_, v)| v.clone()).collect();
        values.extend(batch_keys(records)?);
        self.run(op, &sql, &values, || exec.execute(&sql, &values))
    }

    /// Delete many records by primary key in one statement.
    ///
    /// An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionFailed` if the executor fails.
    pub fn delete_all<X>(&self, exec: &X, records: &[E]) -> Result<u64, QuarryError>
    where
        X: Executor + ?Sized,
    {
        let op = Operation::DeleteAll;
        if records.is_empty() {
            return Ok(0);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(E::TABLE.name, op).entered();

        let sql = statement::delete_all(&E::TABLE, records.len());
        let keys = batch_keys(records)?;
        self.run(op, &sql, &keys, || exec.execute(&sql, &keys))
    }
}

impl<E: Entity + Default> Table<E> {
    /// Fetch one row by primary key.
    ///
    /// With an empty `select` every column is read; otherwise only the named
    /// columns are, and the other fields keep their `Default` values.
    ///
    /// # Errors
    ///
    /// - `KeyMismatch` if `key` has the wrong number of values
    /// - `UnknownColumn` if `select` names a column the entity lacks
    /// - `NotFound` if no row has that key
    /// - `ExecutionFailed` if the executor fails
    /// - `Decode` if a value does not fit its field
    pub fn find<X>(&self, exec: &X, key: &[Value], select: &[&str]) -> Result<E, QuarryError>
    where
        X: Executor + ?Sized,
    {
        let op = Operation::Find;
        check_key::<E>(key)?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(E::TABLE.name, op).entered();

        let (sql, mapping) = if select.is_empty() {
            (
                self.statements.select.clone(),
                FieldMapping::bind::<E, _>(E::TABLE.columns)?,
            )
        } else {
            (
                statement::select_by_key(&E::TABLE, select),
                FieldMapping::bind::<E, _>(select)?,
            )
        };

        let row = self
            .run(op, &sql, key, || exec.query_opt(&sql, key))?
            .ok_or(QuarryError::NotFound {
                table: E::TABLE.name,
            })?;
        decode_row(&mapping, row)
    }

    /// Re-read a record by its own primary key, replacing every field.
    ///
    /// The record is only replaced once the whole row has decoded.
    ///
    /// # Errors
    ///
    /// - `NilInstance` if `record` is `None`
    /// - `NotFound` if the row no longer exists
    /// - `ExecutionFailed` if the executor fails
    /// - `Decode` if a value does not fit its field
    pub fn reload<'r, X>(&self, exec: &X, record: impl Into<Option<&'r mut E>>) -> Result<(), QuarryError>
    where
        X: Executor + ?Sized,
    {
        let op = Operation::Reload;
        let record = require(op, record.into())?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(E::TABLE.name, op).entered();

        let sql = &self.statements.select;
        let key = record.primary_key_values()?;
        let row = self
            .run(op, sql, &key, || exec.query_opt(sql, &key))?
            .ok_or(QuarryError::NotFound {
                table: E::TABLE.name,
            })?;
        *record = decode_row(&FieldMapping::bind::<E, _>(E::TABLE.columns)?, row)?;
        Ok(())
    }

    /// Re-read many records in one statement, replacing the batch with the rows found.
    ///
    /// Rows deleted in the meantime drop out of the batch. An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// - `ExecutionFailed` if the executor fails
    /// - `Decode` if a value does not fit its field
    pub fn reload_all<X>(&self, exec: &X, records: &mut Vec<E>) -> Result<(), QuarryError>
    where
        X: Executor + ?Sized,
    {
        let op = Operation::ReloadAll;
        if records.is_empty() {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(E::TABLE.name, op).entered();

        let sql = statement::select_all_by_keys(&E::TABLE, E::TABLE.columns, records.len());
        let keys = batch_keys(records)?;
        let rows = self.run(op, &sql, &keys, || exec.query_all(&sql, &keys))?;

        let mapping = FieldMapping::bind::<E, _>(E::TABLE.columns)?;
        *records = rows
            .into_iter()
            .map(|row| decode_row(&mapping, row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }
}

impl<E: Entity> Table<E> {
    /// Run one executor call with statement logging, metrics and error wrapping.
    fn run<T, F>(&self, op: Operation, sql: &str, values: &[Value], call: F) -> Result<T, QuarryError>
    where
        F: FnOnce() -> Result<T, ExecutorError>,
    {
        if self.config.log_statements {
            log::debug!(target: "quarry::sql", "{sql}");
            log::debug!(target: "quarry::sql", "{values:?}");
        }

        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        let result = call();

        #[cfg(feature = "metrics")]
        {
            METRICS.record_statement(E::TABLE.name, op, start.elapsed());
            if result.is_err() {
                METRICS.record_error(E::TABLE.name, op);
            }
        }

        result.map_err(|err| {
            log::debug!("{} {} failed: {err}", E::TABLE.name, op);
            QuarryError::execution(op, E::TABLE.name, err)
        })
    }
}

fn require<E: Entity>(op: Operation, record: Option<&mut E>) -> Result<&mut E, QuarryError> {
    record.ok_or(QuarryError::NilInstance {
        op,
        table: E::TABLE.name,
    })
}

fn check_key<E: Entity>(key: &[Value]) -> Result<(), QuarryError> {
    let expected = E::TABLE.primary_key.len();
    if key.len() != expected {
        return Err(QuarryError::KeyMismatch {
            table: E::TABLE.name,
            expected,
            actual: key.len(),
        });
    }
    Ok(())
}

/// Primary-key values of every record, flattened in batch order.
fn batch_keys<E: Entity>(records: &[E]) -> Result<Vec<Value>, QuarryError> {
    let mut keys = Vec::with_capacity(records.len() * E::TABLE.primary_key.len());
    for record in records {
        keys.extend(record.primary_key_values()?);
    }
    Ok(keys)
}

/// Defaultable columns the record currently holds a non-zero value for, in table order.
fn non_zero_defaults<E: Entity>(record: &E) -> Vec<&'static str> {
    E::TABLE
        .columns_with_default
        .iter()
        .copied()
        .filter(|column| E::field(column).is_some_and(|field| !(field.is_zero)(record)))
        .collect()
}

/// Write `now` into a timestamp column.
///
/// `DateTime<Utc>` fields take the instant directly; `NaiveDateTime` fields take
/// it as naive UTC.
fn stamp<E: Entity>(
    record: &mut E,
    column: &'static str,
    now: DateTime<Utc>,
    only_if_zero: bool,
) -> Result<(), QuarryError> {
    let field = E::field(column).ok_or_else(|| QuarryError::UnknownColumn {
        table: E::TABLE.name,
        column: column.to_string(),
    })?;
    if only_if_zero && !(field.is_zero)(record) {
        return Ok(());
    }
    (field.set)(record, Value::from(now))
        .or_else(|_| (field.set)(record, Value::from(now.naive_utc())))
        .map_err(|e| QuarryError::Decode {
            table: E::TABLE.name,
            column: column.to_string(),
            reason: e.to_string(),
        })
}

fn decode_row<E: Entity + Default>(mapping: &FieldMapping, row: Row) -> Result<E, QuarryError> {
    let mut record = E::default();
    mapping.targets(&mut record).scan(row)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{decode, FieldDef};
    use crate::mock::MockExecutor;
    use crate::schema::TableDescriptor;
    use chrono::TimeZone;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Role {
        id: i32,
        name: String,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
    }

    macro_rules! field {
        ($column:literal, $field:ident) => {
            FieldDef {
                column: $column,
                get: |r: &Role| r.$field.clone().into_value(),
                set: |r: &mut Role, v: Value| {
                    r.$field = decode(v)?;
                    Ok(())
                },
                is_zero: |r: &Role| r.$field.is_zero(),
            }
        };
    }

    impl Entity for Role {
        const TABLE: TableDescriptor = TableDescriptor {
            name: "roles",
            columns: &["id", "name", "created_at", "updated_at"],
            columns_with_default: &["id", "created_at", "updated_at"],
            columns_without_default: &["name"],
            primary_key: &["id"],
            created_at: Some("created_at"),
            updated_at: Some("updated_at"),
        };

        const FIELDS: &'static [FieldDef<Self>] = &[
            field!("id", id),
            field!("name", name),
            field!("created_at", created_at),
            field!("updated_at", updated_at),
        ];
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn roles() -> Table<Role> {
        Table::new().with_clock(fixed_now)
    }

    #[test]
    fn test_validate() {
        assert!(Table::<Role>::validate().is_ok());
    }

    #[test]
    fn test_insert_stamps_and_returns_generated_key() {
        let db = MockExecutor::new().append_query_results([vec![vec![Value::Int(Some(11))]]]);
        let mut role = Role {
            name: "admin".into(),
            ..Default::default()
        };

        roles().insert(&db, &mut role, &[]).unwrap();

        assert_eq!(role.id, 11);
        assert_eq!(role.created_at, Some(fixed_now()));
        assert_eq!(role.updated_at, Some(fixed_now()));
        let stmt = db.last_statement().unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"roles\" (\"name\",\"created_at\",\"updated_at\") VALUES ($1,$2,$3) RETURNING \"id\""
        );
        assert_eq!(stmt.params[0], Value::String(Some("admin".into())));
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn test_insert_keeps_caller_timestamps() {
        let earlier = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let db = MockExecutor::new().append_query_results([vec![vec![Value::Int(Some(1))]]]);
        let mut role = Role {
            name: "ops".into(),
            created_at: Some(earlier),
            ..Default::default()
        };
        roles().insert(&db, &mut role, &[]).unwrap();
        assert_eq!(role.created_at, Some(earlier));
    }

    #[test]
    fn test_insert_without_returning_row_fails() {
        let db = MockExecutor::new();
        let mut role = Role::default();
        let err = roles().insert(&db, &mut role, &[]).unwrap_err();
        assert!(matches!(
            err,
            QuarryError::ExecutionFailed {
                op: Operation::Insert,
                ..
            }
        ));
    }

    #[test]
    fn test_nil_instance_never_reaches_executor() {
        let db = MockExecutor::new();
        let table = roles();
        assert!(matches!(
            table.insert(&db, None::<&mut Role>, &[]),
            Err(QuarryError::NilInstance { op: Operation::Insert, .. })
        ));
        assert!(matches!(
            table.update(&db, None::<&mut Role>, &[]),
            Err(QuarryError::NilInstance { op: Operation::Update, .. })
        ));
        assert!(matches!(
            table.upsert(&db, None::<&mut Role>, &UpsertOptions::default()),
            Err(QuarryError::NilInstance { op: Operation::Upsert, .. })
        ));
        assert!(matches!(
            table.delete(&db, None::<&Role>),
            Err(QuarryError::NilInstance { op: Operation::Delete, .. })
        ));
        assert!(matches!(
            table.reload(&db, None::<&mut Role>),
            Err(QuarryError::NilInstance { op: Operation::Reload, .. })
        ));
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_update_numbers_key_last() {
        let db = MockExecutor::new().append_exec_results([1]);
        let mut role = Role {
            id: 4,
            name: "dev".into(),
            ..Default::default()
        };
        let affected = roles().update(&db, &mut role, &["name"]).unwrap();
        assert_eq!(affected, 1);
        let stmt = db.last_statement().unwrap();
        assert_eq!(stmt.sql, "UPDATE \"roles\" SET \"name\"=$1 WHERE \"id\"=$2");
        assert_eq!(
            stmt.params,
            vec![Value::String(Some("dev".into())), Value::Int(Some(4))]
        );
        assert_eq!(role.updated_at, Some(fixed_now()));
    }

    #[test]
    fn test_update_with_only_key_whitelisted() {
        let db = MockExecutor::new();
        let mut role = Role::default();
        let err = roles().update(&db, &mut role, &["id"]).unwrap_err();
        assert!(matches!(err, QuarryError::EmptyColumnSet { op: Operation::Update, .. }));
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_upsert_do_nothing_without_row_is_success() {
        let db = MockExecutor::new();
        let mut role = Role {
            name: "taken".into(),
            ..Default::default()
        };
        roles()
            .upsert(&db, &mut role, &UpsertOptions::do_nothing().conflict(&["name"]))
            .unwrap();
        assert_eq!(role.id, 0);
        assert!(db
            .last_statement()
            .unwrap()
            .sql
            .ends_with("ON CONFLICT (\"name\") DO NOTHING RETURNING \"id\""));
    }

    #[test]
    fn test_upsert_empty_update_set() {
        let db = MockExecutor::new();
        let table = roles();
        let mut role = Role::default();
        let err = table
            .upsert(&db, &mut role, &UpsertOptions::do_update().update(&["id"]))
            .unwrap_err();
        assert!(matches!(err, QuarryError::EmptyUpdateSet { table: "roles" }));
        assert!(table.upsert_cache().is_empty());
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_find_not_found_is_distinguished() {
        let db = MockExecutor::new();
        let err = roles().find(&db, &[Value::Int(Some(9))], &[]).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_find_with_select_subset() {
        let db = MockExecutor::new()
            .append_query_results([vec![vec![Value::String(Some("admin".into()))]]]);
        let role = roles().find(&db, &[Value::Int(Some(2))], &["name"]).unwrap();
        assert_eq!(role.name, "admin");
        assert_eq!(role.id, 0);
        assert_eq!(
            db.last_statement().unwrap().sql,
            "SELECT \"name\" FROM \"roles\" WHERE \"id\"=$1"
        );
    }

    #[test]
    fn test_key_arity_is_checked() {
        let db = MockExecutor::new();
        let err = roles().exists(&db, &[]).unwrap_err();
        assert!(matches!(
            err,
            QuarryError::KeyMismatch {
                expected: 1,
                actual: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_executor_error_is_wrapped() {
        let db = MockExecutor::new().append_error("connection reset");
        let role = Role {
            id: 1,
            ..Default::default()
        };
        let err = roles().delete(&db, &role).unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("unable to delete roles"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_count() {
        let db = MockExecutor::new().append_query_results([vec![vec![Value::BigInt(Some(12))]]]);
        assert_eq!(roles().count(&db).unwrap(), 12);
    }

    #[test]
    fn test_update_all_rejects_unknown_column() {
        let db = MockExecutor::new();
        let err = roles()
            .update_all(&db, &[Role::default()], &[("colour", Value::Int(Some(1)))])
            .unwrap_err();
        assert!(matches!(err, QuarryError::UnknownColumn { .. }));
    }

    /// Hand-written entity whose bindings miss its key column.
    #[derive(Debug, Default)]
    struct Unkeyed {
        name: String,
    }

    impl Entity for Unkeyed {
        const TABLE: TableDescriptor = TableDescriptor {
            name: "unkeyed",
            columns: &["id", "name"],
            columns_with_default: &["id"],
            columns_without_default: &["name"],
            primary_key: &["id"],
            created_at: None,
            updated_at: None,
        };

        const FIELDS: &'static [FieldDef<Self>] = &[FieldDef {
            column: "name",
            get: |r: &Unkeyed| r.name.clone().into_value(),
            set: |r: &mut Unkeyed, v: Value| {
                r.name = decode(v)?;
                Ok(())
            },
            is_zero: |r: &Unkeyed| r.name.is_zero(),
        }];
    }

    #[test]
    fn test_missing_key_binding_is_unknown_column() {
        let db = MockExecutor::new();
        let table = Table::<Unkeyed>::new();
        let record = Unkeyed::default();

        assert!(Table::<Unkeyed>::validate().is_err());
        let err = table.delete(&db, &record).unwrap_err();
        assert!(matches!(
            err,
            QuarryError::UnknownColumn { table: "unkeyed", ref column } if column == "id"
        ));
        let err = table.delete_all(&db, &[Unkeyed::default()]).unwrap_err();
        assert!(matches!(err, QuarryError::UnknownColumn { .. }));
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_do_nothing_ignores_update_list_in_cache_key() {
        let db = MockExecutor::new();
        let table = roles();
        let mut role = Role {
            id: 1,
            name: "ops".into(),
            ..Default::default()
        };

        table
            .upsert(&db, &mut role, &UpsertOptions::do_nothing().update(&["name"]))
            .unwrap();
        table
            .upsert(&db, &mut role, &UpsertOptions::do_nothing().update(&["updated_at"]))
            .unwrap();
        table
            .upsert(&db, &mut role, &UpsertOptions::do_nothing())
            .unwrap();

        assert_eq!(table.upsert_cache().len(), 1);
        let statements = db.statements();
        assert_eq!(statements.len(), 3);
        assert!(statements.iter().all(|s| s.sql == statements[0].sql));
    }

    #[test]
    fn test_clear_caches() {
        let db = MockExecutor::new()
            .append_query_results([vec![vec![Value::Int(Some(1))]]])
            .append_exec_results([1]);
        let table = roles();
        let mut role = Role {
            name: "ops".into(),
            ..Default::default()
        };
        table.insert(&db, &mut role, &[]).unwrap();
        table.update(&db, &mut role, &["name"]).unwrap();
        assert_eq!(table.insert_cache().len(), 1);
        assert_eq!(table.update_cache().len(), 1);

        table.clear_caches();

        assert!(table.insert_cache().is_empty());
        assert!(table.update_cache().is_empty());
        assert!(table.upsert_cache().is_empty());
    }
}
