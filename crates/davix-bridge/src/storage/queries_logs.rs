//! Audit log queries.

use std::time::Duration;

use super::db::{BridgeDatabase, DatabaseError};
use super::excerpt;
use super::models::LogEntry;
use super::secs;
use crate::schema::Table;

/// Parameters for appending an audit log entry.
#[derive(Default)]
pub struct LogParams<'a> {
    pub event: &'a str,
    pub wp_user_id: Option<i64>,
    pub customer_email: Option<&'a str>,
    pub subscription_id: Option<&'a str>,
    pub order_id: Option<&'a str>,
    pub response_action: Option<&'a str>,
    pub http_code: Option<u16>,
    pub error: Option<&'a str>,
}

impl BridgeDatabase {
    // =========================================================================
    // Audit log queries
    // =========================================================================

    /// Append an audit entry. Every call inserts a new row.
    pub async fn append_log(&self, params: &LogParams<'_>) -> Result<i64, DatabaseError> {
        let sql = format!(
            r"
            INSERT INTO {}
                (event, wp_user_id, customer_email, subscription_id, order_id,
                 response_action, http_code, error_excerpt, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            self.table(Table::Logs)
        );

        let result = sqlx::query(&sql)
            .bind(params.event)
            .bind(params.wp_user_id)
            .bind(params.customer_email)
            .bind(params.subscription_id)
            .bind(params.order_id)
            .bind(params.response_action)
            .bind(params.http_code.map(i64::from))
            .bind(params.error.map(excerpt))
            .bind(self.now())
            .execute(self.pool())
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// List audit entries, newest first, optionally for one subscription.
    pub async fn list_logs(
        &self,
        subscription_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<LogEntry>, DatabaseError> {
        let table = self.table(Table::Logs);
        let entries = if let Some(subscription_id) = subscription_id {
            let sql = format!(
                "SELECT * FROM {table} WHERE subscription_id = ? ORDER BY created_at DESC, id DESC LIMIT ?"
            );
            sqlx::query_as::<_, LogEntry>(&sql)
                .bind(subscription_id)
                .bind(limit)
                .fetch_all(self.pool())
                .await?
        } else {
            let sql = format!("SELECT * FROM {table} ORDER BY created_at DESC, id DESC LIMIT ?");
            sqlx::query_as::<_, LogEntry>(&sql)
                .bind(limit)
                .fetch_all(self.pool())
                .await?
        };

        Ok(entries)
    }

    /// Delete audit entries older than `older_than`.
    pub async fn prune_logs(&self, older_than: Duration) -> Result<u64, DatabaseError> {
        let cutoff = self.now().saturating_sub(secs(older_than));
        let sql = format!("DELETE FROM {} WHERE created_at < ?", self.table(Table::Logs));

        let result = sqlx::query(&sql)
            .bind(cutoff)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
