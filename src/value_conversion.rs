//! Conversion between `sea_query::Value` and `may_postgres` wire types.
//!
//! Parameters are boxed as typed `ToSql` values, so a NULL keeps the type of the
//! variant it came from (`Value::Int(None)` binds as a NULL `int4`). Result
//! columns are decoded by their PostgreSQL type into the matching `Value` variant.

use crate::executor::ExecutorError;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use may_postgres::types::{ToSql, Type};
use sea_query::Value;

/// Convert values to `ToSql` parameters and run `f` with them.
///
/// # Errors
///
/// Returns `ExecutorError::Other` for a value with no PostgreSQL mapping, or
/// whatever `f` returns.
pub fn with_converted_params<F, R>(values: &[Value], f: F) -> Result<R, ExecutorError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, ExecutorError>,
{
    let owned = values
        .iter()
        .map(to_sql)
        .collect::<Result<Vec<_>, _>>()?;
    let params: Vec<&dyn ToSql> = owned.iter().map(|p| p.as_ref() as &dyn ToSql).collect();
    f(&params)
}

fn to_sql(value: &Value) -> Result<Box<dyn ToSql>, ExecutorError> {
    let param: Box<dyn ToSql> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::TinyInt(v) => Box::new(v.map(i16::from)),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::TinyUnsigned(v) => Box::new(v.map(i16::from)),
        Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
        Value::Unsigned(v) => Box::new(v.map(i64::from)),
        Value::BigUnsigned(v) => {
            let v = v
                .map(|u| {
                    i64::try_from(u).map_err(|_| {
                        ExecutorError::Other(format!(
                            "BigUnsigned value {u} exceeds i64::MAX and cannot be bound"
                        ))
                    })
                })
                .transpose()?;
            Box::new(v)
        }
        Value::Float(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.as_ref().map(|s| String::clone(s))),
        Value::Char(v) => Box::new(v.map(|c| c.to_string())),
        Value::Bytes(v) => Box::new(v.as_ref().map(|b| Vec::<u8>::clone(b))),
        Value::Json(v) => Box::new(v.as_ref().map(|j| serde_json::Value::clone(j))),
        Value::ChronoDate(v) => Box::new(v.as_ref().map(|d| NaiveDate::clone(d))),
        Value::ChronoTime(v) => Box::new(v.as_ref().map(|t| NaiveTime::clone(t))),
        Value::ChronoDateTime(v) => Box::new(v.as_ref().map(|d| NaiveDateTime::clone(d))),
        Value::ChronoDateTimeUtc(v) => Box::new(v.as_ref().map(|d| DateTime::<Utc>::clone(d))),
        Value::ChronoDateTimeLocal(v) => {
            Box::new(v.as_ref().map(|d| DateTime::<Local>::clone(d)))
        }
        Value::ChronoDateTimeWithTimeZone(v) => {
            Box::new(v.as_ref().map(|d| DateTime::<FixedOffset>::clone(d)))
        }
        Value::Uuid(v) => Box::new(v.as_ref().map(|u| uuid::Uuid::clone(u))),
        other => {
            return Err(ExecutorError::Other(format!(
                "Unsupported value type in query: {other:?}"
            )))
        }
    };
    Ok(param)
}

/// Decode every column of a row into values, in select-list order.
///
/// # Errors
///
/// Returns `ExecutorError::ParseError` for a column type with no `Value` mapping
/// and `ExecutorError::PostgresError` if the driver rejects a conversion.
pub fn row_to_values(row: &may_postgres::Row) -> Result<Vec<Value>, ExecutorError> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| column_value(row, idx, column.type_()))
        .collect()
}

fn column_value(row: &may_postgres::Row, idx: usize, ty: &Type) -> Result<Value, ExecutorError> {
    let value = if *ty == Type::BOOL {
        Value::from(row.try_get::<_, Option<bool>>(idx)?)
    } else if *ty == Type::INT2 {
        Value::from(row.try_get::<_, Option<i16>>(idx)?)
    } else if *ty == Type::INT4 {
        Value::from(row.try_get::<_, Option<i32>>(idx)?)
    } else if *ty == Type::INT8 {
        Value::from(row.try_get::<_, Option<i64>>(idx)?)
    } else if *ty == Type::FLOAT4 {
        Value::from(row.try_get::<_, Option<f32>>(idx)?)
    } else if *ty == Type::FLOAT8 {
        Value::from(row.try_get::<_, Option<f64>>(idx)?)
    } else if *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
    {
        Value::from(row.try_get::<_, Option<String>>(idx)?)
    } else if *ty == Type::BYTEA {
        Value::from(row.try_get::<_, Option<Vec<u8>>>(idx)?)
    } else if *ty == Type::TIMESTAMPTZ {
        Value::from(row.try_get::<_, Option<DateTime<Utc>>>(idx)?)
    } else if *ty == Type::TIMESTAMP {
        Value::from(row.try_get::<_, Option<NaiveDateTime>>(idx)?)
    } else if *ty == Type::DATE {
        Value::from(row.try_get::<_, Option<NaiveDate>>(idx)?)
    } else if *ty == Type::TIME {
        Value::from(row.try_get::<_, Option<NaiveTime>>(idx)?)
    } else if *ty == Type::UUID {
        Value::from(row.try_get::<_, Option<uuid::Uuid>>(idx)?)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        Value::from(row.try_get::<_, Option<serde_json::Value>>(idx)?)
    } else {
        return Err(ExecutorError::ParseError(format!(
            "column {idx} has unsupported type {ty}"
        )));
    };
    Ok(value)
}
