//! License key record queries.

use super::db::{BridgeDatabase, DatabaseError};
use super::excerpt;
use super::models::{KeyFingerprint, LicenseKeyRecord};
use crate::schema::Table;

/// Parameters for inserting or updating a license key record.
pub struct KeyParams<'a> {
    pub wp_user_id: i64,
    pub customer_email: &'a str,
    pub subscription_id: &'a str,
    pub order_id: Option<&'a str>,
    pub plan_slug: &'a str,
    pub status: &'a str,
    pub fingerprint: Option<&'a KeyFingerprint>,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    pub node_plan_id: Option<&'a str>,
    pub node_api_key_id: Option<&'a str>,
}

impl BridgeDatabase {
    // =========================================================================
    // License key queries
    // =========================================================================

    /// Insert or update the key record for `(wp_user_id, subscription_id)`.
    ///
    /// A fingerprint of `None` keeps the stored one. Fails with
    /// `DatabaseError::Conflict` when `node_api_key_id` already belongs to
    /// another record.
    pub async fn upsert_key(
        &self,
        params: &KeyParams<'_>,
    ) -> Result<LicenseKeyRecord, DatabaseError> {
        let now = self.now();
        let table = self.table(Table::Keys);

        let sql = format!(
            r"
            INSERT INTO {table}
                (wp_user_id, customer_email, subscription_id, order_id, plan_slug, status,
                 key_prefix, key_last4, valid_from, valid_until, node_plan_id, node_api_key_id,
                 created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            ON CONFLICT(wp_user_id, subscription_id) DO UPDATE SET
                customer_email = excluded.customer_email,
                order_id = COALESCE(excluded.order_id, {table}.order_id),
                plan_slug = excluded.plan_slug,
                status = excluded.status,
                key_prefix = COALESCE(excluded.key_prefix, {table}.key_prefix),
                key_last4 = COALESCE(excluded.key_last4, {table}.key_last4),
                valid_from = excluded.valid_from,
                valid_until = excluded.valid_until,
                node_plan_id = COALESCE(excluded.node_plan_id, {table}.node_plan_id),
                node_api_key_id = COALESCE(excluded.node_api_key_id, {table}.node_api_key_id),
                updated_at = excluded.updated_at
            "
        );

        sqlx::query(&sql)
            .bind(params.wp_user_id)
            .bind(params.customer_email)
            .bind(params.subscription_id)
            .bind(params.order_id)
            .bind(params.plan_slug)
            .bind(params.status)
            .bind(params.fingerprint.map(|f| f.prefix.as_str()))
            .bind(params.fingerprint.map(|f| f.last4.as_str()))
            .bind(params.valid_from)
            .bind(params.valid_until)
            .bind(params.node_plan_id)
            .bind(params.node_api_key_id)
            .bind(now)
            .execute(self.pool())
            .await?;

        self.get_key(params.wp_user_id, params.subscription_id)
            .await?
            .ok_or_else(|| {
                DatabaseError::NotFound(format!(
                    "Key for user {} subscription {}",
                    params.wp_user_id, params.subscription_id
                ))
            })
    }

    /// Get the key record for a user/subscription pair.
    pub async fn get_key(
        &self,
        wp_user_id: i64,
        subscription_id: &str,
    ) -> Result<Option<LicenseKeyRecord>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM {} WHERE wp_user_id = ? AND subscription_id = ?",
            self.table(Table::Keys)
        );
        let record = sqlx::query_as::<_, LicenseKeyRecord>(&sql)
            .bind(wp_user_id)
            .bind(subscription_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(record)
    }

    /// Find the local record mapped to a remote key id.
    pub async fn find_key_by_node_id(
        &self,
        node_api_key_id: &str,
    ) -> Result<Option<LicenseKeyRecord>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM {} WHERE node_api_key_id = ?",
            self.table(Table::Keys)
        );
        let record = sqlx::query_as::<_, LicenseKeyRecord>(&sql)
            .bind(node_api_key_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(record)
    }

    /// List all key records for a user, newest first.
    pub async fn list_keys_for_user(
        &self,
        wp_user_id: i64,
    ) -> Result<Vec<LicenseKeyRecord>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM {} WHERE wp_user_id = ? ORDER BY updated_at DESC, id DESC",
            self.table(Table::Keys)
        );
        let records = sqlx::query_as::<_, LicenseKeyRecord>(&sql)
            .bind(wp_user_id)
            .fetch_all(self.pool())
            .await?;

        Ok(records)
    }

    /// Record the outcome of the last remote call made for a key.
    pub async fn record_key_action(
        &self,
        id: i64,
        action: &str,
        http_code: Option<u16>,
        error: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let sql = format!(
            "UPDATE {} SET last_action = ?, last_http_code = ?, last_error = ?, updated_at = ? WHERE id = ?",
            self.table(Table::Keys)
        );
        let result = sqlx::query(&sql)
            .bind(action)
            .bind(http_code.map(i64::from))
            .bind(error.map(excerpt))
            .bind(self.now())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
