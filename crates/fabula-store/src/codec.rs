//! Helper functions for reading rows and binding values
//!
//! Ids are stored as canonical UUID text, timestamps as RFC 3339 text and
//! attribute bags as JSON object text.

use chrono::{DateTime, Utc};
use fabula_core::time::{format_timestamp, parse_timestamp};
use fabula_core::{Error, Result};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

fn column_error(col: &str, e: impl std::fmt::Display) -> Error {
    Error::internal(format!("invalid value in column {col}: {e}"))
}

/// Required text column
pub(crate) fn text(row: &SqliteRow, col: &str) -> Result<String> {
    row.try_get::<String, _>(col).map_err(|e| column_error(col, e))
}

/// Nullable text column
pub(crate) fn opt_text(row: &SqliteRow, col: &str) -> Result<Option<String>> {
    row.try_get::<Option<String>, _>(col)
        .map_err(|e| column_error(col, e))
}

/// Required integer column
pub(crate) fn int(row: &SqliteRow, col: &str) -> Result<i32> {
    row.try_get::<i32, _>(col).map_err(|e| column_error(col, e))
}

/// Nullable integer column
pub(crate) fn opt_int(row: &SqliteRow, col: &str) -> Result<Option<i32>> {
    row.try_get::<Option<i32>, _>(col)
        .map_err(|e| column_error(col, e))
}

/// Nullable real column
pub(crate) fn opt_real(row: &SqliteRow, col: &str) -> Result<Option<f64>> {
    row.try_get::<Option<f64>, _>(col)
        .map_err(|e| column_error(col, e))
}

/// 0/1 integer column
pub(crate) fn flag(row: &SqliteRow, col: &str) -> Result<bool> {
    Ok(row
        .try_get::<i64, _>(col)
        .map_err(|e| column_error(col, e))?
        != 0)
}

/// Required UUID column
pub(crate) fn uuid(row: &SqliteRow, col: &str) -> Result<Uuid> {
    let raw = text(row, col)?;
    Uuid::parse_str(&raw).map_err(|e| column_error(col, e))
}

/// Nullable UUID column
pub(crate) fn opt_uuid(row: &SqliteRow, col: &str) -> Result<Option<Uuid>> {
    opt_text(row, col)?
        .filter(|s| !s.is_empty())
        .map(|s| Uuid::parse_str(&s).map_err(|e| column_error(col, e)))
        .transpose()
}

/// Required timestamp column
pub(crate) fn timestamp(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>> {
    let raw = text(row, col)?;
    parse_timestamp(&raw).map_err(|e| column_error(col, e))
}

/// Column holding a value of a closed enumeration
pub(crate) fn parse<T>(row: &SqliteRow, col: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    text(row, col)?
        .parse()
        .map_err(|e: String| column_error(col, e))
}

/// JSON object column; missing, empty or invalid text reads as `{}`
pub(crate) fn json_object(row: &SqliteRow, col: &str) -> Map<String, Value> {
    row.try_get::<Option<String>, _>(col)
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}

/// Bind form of a timestamp
pub(crate) fn ts(value: &DateTime<Utc>) -> String {
    format_timestamp(value)
}

/// Bind form of a nullable id
pub(crate) fn opt_id(value: Option<Uuid>) -> Option<String> {
    value.map(|id| id.to_string())
}

/// Bind form of an attribute bag (always an object)
pub(crate) fn json_text(value: &Map<String, Value>) -> String {
    Value::Object(value.clone()).to_string()
}
