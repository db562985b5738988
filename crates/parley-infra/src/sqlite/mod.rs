//! SQLite storage layer.
//!
//! Store implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod checkpoint;
pub mod message;
pub mod pool;
pub mod thread;

use chrono::{DateTime, SecondsFormat, Utc};
use parley_types::error::RepositoryError;

/// Fixed-width RFC 3339 (microseconds, `Z` suffix) so that text order in
/// SQLite matches time order.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Pool exhaustion and IO failures are reported as `Connection` so callers
/// can tell a retryable outage from a rejected statement.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection
        }
        other => RepositoryError::Query(other.to_string()),
    }
}
