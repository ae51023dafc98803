//! `SQLite` storage for the license bridge.
//!
//! Provides persistence for license key records, audit logs and the user
//! license read-model. Queue tables are driven through [`crate::queue`].

mod db;
mod models;
mod queries_keys;
mod queries_logs;
mod queries_user;

#[cfg(test)]
mod tests;

use std::time::Duration;

pub use db::{BridgeDatabase, DatabaseError};
pub use models::*;
pub use queries_keys::KeyParams;
pub use queries_logs::LogParams;
pub use queries_user::{MappingParams, UpsertOutcome};

/// Longest error text kept in `last_error` / `error_excerpt` columns.
pub const MAX_ERROR_CHARS: usize = 1000;

/// Truncate error text to [`MAX_ERROR_CHARS`] characters.
pub(crate) fn excerpt(error: &str) -> String {
    error.chars().take(MAX_ERROR_CHARS).collect()
}

/// Whole seconds of a duration as a timestamp delta.
pub(crate) fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
