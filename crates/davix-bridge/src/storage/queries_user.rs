//! User license mapping (read-model) queries.

use super::db::{BridgeDatabase, DatabaseError};
use super::models::UserLicenseMapping;
use crate::schema::Table;

/// Parameters for upserting a user mapping.
pub struct MappingParams<'a> {
    pub wp_user_id: i64,
    pub customer_email: Option<&'a str>,
    pub subscription_id: &'a str,
    pub plan_slug: Option<&'a str>,
    pub status: &'a str,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    pub source: &'a str,
    /// Version of the data being written; older versions never overwrite newer.
    pub updated_at: i64,
    pub last_sync_at: Option<i64>,
}

/// Result of a last-write-wins upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    /// The stored row carries a newer `updated_at`; nothing was written.
    Stale,
}

impl BridgeDatabase {
    // =========================================================================
    // User mapping queries
    // =========================================================================

    /// Insert or update the mapping for `(wp_user_id, subscription_id)`.
    ///
    /// Last write wins on `updated_at`: a write whose `updated_at` is older
    /// than the stored one is ignored.
    pub async fn upsert_user_mapping(
        &self,
        params: &MappingParams<'_>,
    ) -> Result<UpsertOutcome, DatabaseError> {
        let table = self.table(Table::User);
        let sql = format!(
            r"
            INSERT INTO {table}
                (wp_user_id, customer_email, subscription_id, plan_slug, status,
                 valid_from, valid_until, last_sync_at, source, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(wp_user_id, subscription_id) DO UPDATE SET
                customer_email = excluded.customer_email,
                plan_slug = excluded.plan_slug,
                status = excluded.status,
                valid_from = excluded.valid_from,
                valid_until = excluded.valid_until,
                last_sync_at = COALESCE(excluded.last_sync_at, {table}.last_sync_at),
                source = excluded.source,
                updated_at = excluded.updated_at
            WHERE excluded.updated_at >= {table}.updated_at
            "
        );

        let result = sqlx::query(&sql)
            .bind(params.wp_user_id)
            .bind(params.customer_email)
            .bind(params.subscription_id)
            .bind(params.plan_slug)
            .bind(params.status)
            .bind(params.valid_from)
            .bind(params.valid_until)
            .bind(params.last_sync_at)
            .bind(params.source)
            .bind(self.now())
            .bind(params.updated_at)
            .execute(self.pool())
            .await?;

        Ok(if result.rows_affected() > 0 {
            UpsertOutcome::Applied
        } else {
            UpsertOutcome::Stale
        })
    }

    /// Get the mapping for a user/subscription pair.
    pub async fn get_user_mapping(
        &self,
        wp_user_id: i64,
        subscription_id: &str,
    ) -> Result<Option<UserLicenseMapping>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM {} WHERE wp_user_id = ? AND subscription_id = ?",
            self.table(Table::User)
        );
        let mapping = sqlx::query_as::<_, UserLicenseMapping>(&sql)
            .bind(wp_user_id)
            .bind(subscription_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(mapping)
    }

    /// List all mappings for a user.
    pub async fn list_user_mappings(
        &self,
        wp_user_id: i64,
    ) -> Result<Vec<UserLicenseMapping>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM {} WHERE wp_user_id = ? ORDER BY subscription_id",
            self.table(Table::User)
        );
        let mappings = sqlx::query_as::<_, UserLicenseMapping>(&sql)
            .bind(wp_user_id)
            .fetch_all(self.pool())
            .await?;

        Ok(mappings)
    }

    /// Mappings never synced, or last synced before `cutoff`.
    pub async fn list_mappings_synced_before(
        &self,
        cutoff: i64,
    ) -> Result<Vec<UserLicenseMapping>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM {} WHERE last_sync_at IS NULL OR last_sync_at < ? \
             ORDER BY last_sync_at ASC, id ASC",
            self.table(Table::User)
        );
        let mappings = sqlx::query_as::<_, UserLicenseMapping>(&sql)
            .bind(cutoff)
            .fetch_all(self.pool())
            .await?;

        Ok(mappings)
    }
}
