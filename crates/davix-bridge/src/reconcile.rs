//! Reconciliation of the user license read-model.
//!
//! `davix_bridge_user` is a denormalized copy of what the key records say.
//! It is written only from here, and each row carries `last_sync_at` so
//! readers can tell how stale it is.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::schema::Table;
use crate::storage::{
    BridgeDatabase, DatabaseError, LicenseKeyRecord, MappingParams, UpsertOutcome,
    UserLicenseMapping, secs,
};

/// Value of `source` on mappings written by the reconciler.
pub const SOURCE_KEYS: &str = "keys";

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("No key record for user {wp_user_id} subscription {subscription_id}")]
    KeyNotFound {
        wp_user_id: i64,
        subscription_id: String,
    },

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl From<sqlx::Error> for ReconcileError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.into())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Mappings written.
    pub synced: usize,
    /// Mappings left alone because they already held newer data.
    pub stale_writes: usize,
}

/// Keeps `davix_bridge_user` in line with `davix_bridge_keys`.
#[derive(Clone)]
pub struct Reconciler {
    db: BridgeDatabase,
}

impl Reconciler {
    pub const fn new(db: BridgeDatabase) -> Self {
        Self { db }
    }

    /// Copy one key record into the read-model.
    pub async fn reconcile(
        &self,
        wp_user_id: i64,
        subscription_id: &str,
    ) -> Result<UpsertOutcome, ReconcileError> {
        let record = self
            .db
            .get_key(wp_user_id, subscription_id)
            .await?
            .ok_or_else(|| ReconcileError::KeyNotFound {
                wp_user_id,
                subscription_id: subscription_id.to_string(),
            })?;

        self.apply(&record).await
    }

    async fn apply(&self, record: &LicenseKeyRecord) -> Result<UpsertOutcome, ReconcileError> {
        let outcome = self
            .db
            .upsert_user_mapping(&MappingParams {
                wp_user_id: record.wp_user_id,
                customer_email: Some(&record.customer_email),
                subscription_id: &record.subscription_id,
                plan_slug: Some(&record.plan_slug),
                status: &record.status,
                valid_from: record.valid_from,
                valid_until: record.valid_until,
                source: SOURCE_KEYS,
                updated_at: record.updated_at,
                last_sync_at: Some(self.db.now()),
            })
            .await?;

        match outcome {
            UpsertOutcome::Applied => debug!(
                wp_user_id = record.wp_user_id,
                subscription_id = %record.subscription_id,
                status = %record.status,
                "User mapping reconciled"
            ),
            UpsertOutcome::Stale => warn!(
                wp_user_id = record.wp_user_id,
                subscription_id = %record.subscription_id,
                "User mapping holds newer data than its key record; left unchanged"
            ),
        }
        Ok(outcome)
    }

    /// Reconcile every key record that has no mapping yet, changed since its
    /// mapping was last synced, or disagrees with its mapping.
    ///
    /// Timestamps are whole seconds, so a key rewritten in the same second as
    /// the last sync is caught by comparing the copied fields.
    pub async fn reconcile_all(&self) -> Result<ReconcileReport, ReconcileError> {
        let keys = self.db.table(Table::Keys);
        let users = self.db.table(Table::User);
        let sql = format!(
            r"
            SELECT k.* FROM {keys} k
            LEFT JOIN {users} u
                ON u.wp_user_id = k.wp_user_id AND u.subscription_id = k.subscription_id
            WHERE u.id IS NULL
               OR u.last_sync_at IS NULL
               OR k.updated_at > u.last_sync_at
               OR k.status IS NOT u.status
               OR k.plan_slug IS NOT u.plan_slug
               OR k.customer_email IS NOT u.customer_email
               OR k.valid_from IS NOT u.valid_from
               OR k.valid_until IS NOT u.valid_until
            ORDER BY k.id ASC
            "
        );
        let pending = sqlx::query_as::<_, LicenseKeyRecord>(&sql)
            .fetch_all(self.db.pool())
            .await?;

        let mut report = ReconcileReport::default();
        for record in &pending {
            match self.apply(record).await? {
                UpsertOutcome::Applied => report.synced += 1,
                UpsertOutcome::Stale => report.stale_writes += 1,
            }
        }

        info!(
            synced = report.synced,
            stale_writes = report.stale_writes,
            "Reconciliation pass complete"
        );
        Ok(report)
    }

    /// Mappings not synced within `bound`.
    pub async fn stale_mappings(
        &self,
        bound: Duration,
    ) -> Result<Vec<UserLicenseMapping>, ReconcileError> {
        let cutoff = self.db.now().saturating_sub(secs(bound));
        let stale = self.db.list_mappings_synced_before(cutoff).await?;
        if !stale.is_empty() {
            warn!(count = stale.len(), bound_secs = bound.as_secs(), "Stale user mappings");
        }
        Ok(stale)
    }
}
