//! Mapping from driver errors to the domain error taxonomy
//!
//! SQLite reports constraint violations as plain strings, so classification
//! is by substring.

use fabula_core::Error;
use std::fmt::Display;

const UNIQUE_VIOLATION: &str = "UNIQUE constraint failed";
const FOREIGN_KEY_VIOLATION: &str = "FOREIGN KEY constraint failed";
const NO_ROWS: &str = "no rows";

/// What a driver error means for the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbFailure {
    /// The lookup matched nothing
    NoRows,
    /// A unique index rejected the write; carries the offending column list
    Unique(String),
    /// A foreign key rejected the write
    ForeignKey,
    /// Anything else
    Other,
}

/// Classify a driver error
#[must_use]
pub fn classify(err: &sqlx::Error) -> DbFailure {
    if matches!(err, sqlx::Error::RowNotFound) {
        return DbFailure::NoRows;
    }

    let message = match err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    };

    if let Some(pos) = message.find(UNIQUE_VIOLATION) {
        DbFailure::Unique(unique_columns(&message[pos + UNIQUE_VIOLATION.len()..]))
    } else if message.contains(FOREIGN_KEY_VIOLATION) {
        DbFailure::ForeignKey
    } else if message.contains(NO_ROWS) {
        DbFailure::NoRows
    } else {
        DbFailure::Other
    }
}

/// `": tenants.name, tenants.x"` -> `"name,x"`
fn unique_columns(detail: &str) -> String {
    let columns: Vec<&str> = detail
        .trim_start_matches(':')
        .split(',')
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.rsplit('.').next().unwrap_or(c))
        .collect();
    if columns.is_empty() {
        "unique".to_string()
    } else {
        columns.join(",")
    }
}

/// Map a driver error for `resource` identified by `id`
pub fn map_db_error(err: sqlx::Error, resource: &str, id: &str) -> Error {
    match classify(&err) {
        DbFailure::NoRows => Error::not_found(resource, id),
        DbFailure::Unique(field) => Error::already_exists(resource, field, id),
        DbFailure::ForeignKey => {
            Error::conflict(resource, "references a row that does not exist")
        }
        DbFailure::Other => Error::internal(err),
    }
}

/// Error mapper for a statement about `resource` identified by `id`
pub(crate) fn db_error(
    resource: &'static str,
    id: impl Display,
) -> impl FnOnce(sqlx::Error) -> Error {
    let id = id.to_string();
    move |err| map_db_error(err, resource, &id)
}

/// Error mapper that reports unique violations against a natural key
pub(crate) fn unique_error(
    resource: &'static str,
    field: &'static str,
    value: impl Display,
) -> impl FnOnce(sqlx::Error) -> Error {
    let value = value.to_string();
    move |err| match classify(&err) {
        DbFailure::Unique(_) => Error::already_exists(resource, field, value),
        _ => map_db_error(err, resource, &value),
    }
}

/// Error mapper for statements with no meaningful resource (pragmas, transactions)
pub(crate) fn map_internal(err: sqlx::Error) -> Error {
    Error::internal(err)
}
