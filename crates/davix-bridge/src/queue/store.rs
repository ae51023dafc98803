//! Queue operations over one queue table.

use std::sync::Arc;
use std::time::Duration;

use davix_core::config::QueueConfig;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backoff::{BackoffPolicy, ExponentialBackoff};
use super::{QueueError, QueueItem, QueueKind, QueueStatus};
use crate::storage::{BridgeDatabase, DatabaseError, excerpt, secs};

/// Row is claimable at `?1` (now): pending and due with no live lease, or
/// processing under an expired lease.
const ELIGIBLE: &str = "(status = 'pending' AND next_run_at <= ?1 \
     AND (locked_until IS NULL OR locked_until <= ?1)) \
     OR (status = 'processing' AND locked_until IS NOT NULL AND locked_until <= ?1)";

/// Who or what a purge request is about.
#[derive(Debug, Default)]
pub struct PurgeSubject<'a> {
    pub wp_user_id: Option<i64>,
    pub customer_email: Option<&'a str>,
    pub subscription_id: Option<&'a str>,
    pub node_api_key_id: Option<&'a str>,
    pub reason: &'a str,
}

/// Row counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub done: i64,
    pub failed: i64,
    /// Processing rows whose lease has run out; they will be reclaimed.
    pub expired_leases: i64,
}

impl QueueStats {
    pub const fn total(&self) -> i64 {
        self.pending + self.processing + self.done + self.failed
    }
}

/// Handle to one queue table.
#[derive(Clone)]
pub struct WorkQueue {
    db: BridgeDatabase,
    kind: QueueKind,
    lease: Duration,
    max_attempts: u32,
    backoff: Arc<dyn BackoffPolicy>,
}

impl WorkQueue {
    pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(db: BridgeDatabase, kind: QueueKind) -> Self {
        Self {
            db,
            kind,
            lease: Self::DEFAULT_LEASE,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            backoff: Arc::new(ExponentialBackoff::new(
                Duration::from_secs(30),
                Duration::from_secs(3600),
            )),
        }
    }

    pub fn from_config(db: BridgeDatabase, kind: QueueKind, config: &QueueConfig) -> Self {
        Self::new(db, kind)
            .with_lease(Duration::from_secs(config.lease_secs))
            .with_retry(
                config.max_attempts,
                ExponentialBackoff::from_config(config),
            )
    }

    #[must_use]
    pub const fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Set the attempt limit (at least 1) and the backoff between attempts.
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, backoff: impl BackoffPolicy + 'static) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = Arc::new(backoff);
        self
    }

    pub const fn kind(&self) -> QueueKind {
        self.kind
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn table(&self) -> &str {
        self.db.table(self.kind.table())
    }

    const fn is_purge(&self) -> bool {
        matches!(self.kind, QueueKind::Purge)
    }

    fn insert_error(&self, e: sqlx::Error, event_id: &str) -> QueueError {
        let e = DatabaseError::from(e);
        if e.is_conflict() {
            debug!(queue = %self.kind, event_id, "Duplicate enqueue rejected");
            QueueError::DuplicateEvent {
                event_id: event_id.to_string(),
            }
        } else {
            QueueError::Storage(e)
        }
    }

    // =========================================================================
    // Producer side
    // =========================================================================

    /// Enqueue a work item, due immediately.
    ///
    /// Fails with [`QueueError::DuplicateEvent`] if `event_id` was enqueued
    /// before; no second row is created.
    pub async fn enqueue<T>(&self, event_id: &str, payload: &T) -> Result<QueueItem, QueueError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(payload)?;
        let now = self.db.now();
        let sql = format!(
            "INSERT INTO {} (event_id, payload, status, attempts, next_run_at, created_at, updated_at) \
             VALUES (?1, ?2, 'pending', 0, ?3, ?3, ?3) RETURNING *",
            self.table()
        );

        let item = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(event_id)
            .bind(&payload)
            .bind(now)
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| self.insert_error(e, event_id))?;

        info!(queue = %self.kind, id = item.id, event_id, "Work item enqueued");
        Ok(item)
    }

    /// Enqueue a purge request with its subject identifiers.
    pub async fn enqueue_purge<T>(
        &self,
        event_id: &str,
        payload: &T,
        subject: &PurgeSubject<'_>,
    ) -> Result<QueueItem, QueueError>
    where
        T: Serialize + ?Sized,
    {
        if !self.is_purge() {
            return Err(QueueError::Unsupported(self.kind));
        }

        let payload = serde_json::to_string(payload)?;
        let now = self.db.now();
        let sql = format!(
            r"
            INSERT INTO {}
                (event_id, payload, status, attempts, next_run_at, wp_user_id, customer_email,
                 subscription_id, node_api_key_id, reason, created_at, updated_at)
            VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?5, ?6, ?7, ?8, ?3, ?3)
            RETURNING *
            ",
            self.table()
        );

        let item = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(event_id)
            .bind(&payload)
            .bind(now)
            .bind(subject.wp_user_id)
            .bind(subject.customer_email)
            .bind(subject.subscription_id)
            .bind(subject.node_api_key_id)
            .bind(subject.reason)
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| self.insert_error(e, event_id))?;

        info!(
            queue = %self.kind,
            id = item.id,
            event_id,
            reason = subject.reason,
            "Purge request enqueued"
        );
        Ok(item)
    }

    // =========================================================================
    // Worker side
    // =========================================================================

    /// Claim the oldest eligible row with the default lease.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<QueueItem>, QueueError> {
        self.claim(worker_id, self.lease).await
    }

    /// Atomically claim the oldest eligible row (by `next_run_at`, then `id`).
    ///
    /// The row moves to `processing` under a fresh `<worker_id>:<uuid>` token
    /// valid until `now + lease`. Returns `None` when nothing is eligible.
    pub async fn claim(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<QueueItem>, QueueError> {
        let now = self.db.now();
        let locked_until = now.saturating_add(secs(lease));
        let token = format!("{worker_id}:{}", Uuid::new_v4());
        let table = self.table();
        let started = if self.is_purge() {
            ", started_at = COALESCE(started_at, ?1)"
        } else {
            ""
        };

        // Eligibility is re-checked on the outer row so the update is a
        // compare-and-set even if the subquery raced another claimer.
        let sql = format!(
            r"
            UPDATE {table}
            SET status = 'processing', locked_until = ?2, claim_token = ?3, updated_at = ?1{started}
            WHERE id = (
                SELECT id FROM {table}
                WHERE {ELIGIBLE}
                ORDER BY next_run_at ASC, id ASC
                LIMIT 1
            )
            AND ({ELIGIBLE})
            RETURNING *
            "
        );

        let item = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(now)
            .bind(locked_until)
            .bind(&token)
            .fetch_optional(self.db.pool())
            .await?;

        if let Some(item) = &item {
            debug!(
                queue = %self.kind,
                id = item.id,
                event_id = %item.event_id,
                worker_id,
                attempts = item.attempts,
                locked_until,
                "Work item claimed"
            );
        }
        Ok(item)
    }

    /// Extend the lease to `now + lease` if `claim_token` still holds it.
    pub async fn heartbeat(
        &self,
        id: i64,
        claim_token: &str,
        lease: Duration,
    ) -> Result<QueueItem, QueueError> {
        let now = self.db.now();
        let sql = format!(
            "UPDATE {} SET locked_until = ?1, updated_at = ?2 \
             WHERE id = ?3 AND claim_token = ?4 AND status = 'processing' RETURNING *",
            self.table()
        );

        sqlx::query_as::<_, QueueItem>(&sql)
            .bind(now.saturating_add(secs(lease)))
            .bind(now)
            .bind(id)
            .bind(claim_token)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| self.lease_lost(id, "heartbeat"))
    }

    /// Mark a claimed row done.
    pub async fn complete(&self, id: i64, claim_token: &str) -> Result<QueueItem, QueueError> {
        let now = self.db.now();
        let finished = if self.is_purge() {
            ", finished_at = ?1"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE {} SET status = 'done', locked_until = NULL, claim_token = NULL, \
             updated_at = ?1{finished} \
             WHERE id = ?2 AND claim_token = ?3 AND status = 'processing' RETURNING *",
            self.table()
        );

        let item = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(now)
            .bind(id)
            .bind(claim_token)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| self.lease_lost(id, "complete"))?;

        info!(queue = %self.kind, id, event_id = %item.event_id, "Work item completed");
        Ok(item)
    }

    /// Record a failed attempt using the queue's backoff policy.
    pub async fn fail(
        &self,
        id: i64,
        claim_token: &str,
        error: &str,
    ) -> Result<QueueItem, QueueError> {
        self.fail_with(id, claim_token, error, self.backoff.as_ref())
            .await
    }

    /// Record a failed attempt and release the lease.
    ///
    /// Below the attempt limit the row goes back to `pending`, due after
    /// `backoff.delay(attempts)`. At the limit it becomes `failed` and its
    /// `next_run_at` is left as it was.
    pub async fn fail_with(
        &self,
        id: i64,
        claim_token: &str,
        error: &str,
        backoff: &dyn BackoffPolicy,
    ) -> Result<QueueItem, QueueError> {
        let select = format!(
            "SELECT * FROM {} WHERE id = ? AND claim_token = ? AND status = 'processing'",
            self.table()
        );
        let current = sqlx::query_as::<_, QueueItem>(&select)
            .bind(id)
            .bind(claim_token)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| self.lease_lost(id, "fail"))?;

        let now = self.db.now();
        let attempts = current.attempts.saturating_add(1);
        let terminal = attempts >= i64::from(self.max_attempts);
        let (status, next_run_at) = if terminal {
            (QueueStatus::Failed, current.next_run_at)
        } else {
            let delay = backoff.delay(u32::try_from(attempts).unwrap_or(u32::MAX));
            (QueueStatus::Pending, now.saturating_add(secs(delay)))
        };
        let finished = if terminal && self.is_purge() {
            ", finished_at = ?5"
        } else {
            ""
        };

        // `attempts = ?8` pins the row to the state read above.
        let sql = format!(
            "UPDATE {} SET status = ?1, attempts = ?2, last_error = ?3, next_run_at = ?4, \
             locked_until = NULL, claim_token = NULL, updated_at = ?5{finished} \
             WHERE id = ?6 AND claim_token = ?7 AND status = 'processing' AND attempts = ?8 \
             RETURNING *",
            self.table()
        );

        let item = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(status)
            .bind(attempts)
            .bind(excerpt(error))
            .bind(next_run_at)
            .bind(now)
            .bind(id)
            .bind(claim_token)
            .bind(current.attempts)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| self.lease_lost(id, "fail"))?;

        if terminal {
            error!(
                queue = %self.kind,
                id,
                event_id = %item.event_id,
                attempts,
                error,
                "Work item failed permanently"
            );
        } else {
            warn!(
                queue = %self.kind,
                id,
                event_id = %item.event_id,
                attempts,
                next_run_at,
                error,
                "Work item failed, retry scheduled"
            );
        }
        Ok(item)
    }

    fn lease_lost(&self, id: i64, op: &str) -> QueueError {
        warn!(queue = %self.kind, id, op, "Lease lost");
        QueueError::LeaseLost {
            queue: self.kind,
            id,
        }
    }

    // =========================================================================
    // Operator side
    // =========================================================================

    pub async fn get(&self, id: i64) -> Result<QueueItem, QueueError> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.table());
        sqlx::query_as::<_, QueueItem>(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or(QueueError::NotFound {
                queue: self.kind,
                id,
            })
    }

    pub async fn get_by_event(&self, event_id: &str) -> Result<Option<QueueItem>, QueueError> {
        let sql = format!("SELECT * FROM {} WHERE event_id = ?", self.table());
        let item = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(event_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(item)
    }

    /// List rows, oldest first, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<QueueStatus>,
        limit: u32,
    ) -> Result<Vec<QueueItem>, QueueError> {
        let table = self.table();
        let items = if let Some(status) = status {
            let sql = format!("SELECT * FROM {table} WHERE status = ? ORDER BY id ASC LIMIT ?");
            sqlx::query_as::<_, QueueItem>(&sql)
                .bind(status)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
        } else {
            let sql = format!("SELECT * FROM {table} ORDER BY id ASC LIMIT ?");
            sqlx::query_as::<_, QueueItem>(&sql)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
        };

        Ok(items)
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let table = self.table();
        let rows: Vec<(QueueStatus, i64)> = sqlx::query_as(&format!(
            "SELECT status, COUNT(*) FROM {table} GROUP BY status"
        ))
        .fetch_all(self.db.pool())
        .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match status {
                QueueStatus::Pending => stats.pending = count,
                QueueStatus::Processing => stats.processing = count,
                QueueStatus::Done => stats.done = count,
                QueueStatus::Failed => stats.failed = count,
            }
        }

        let expired: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {table} WHERE status = 'processing' AND locked_until <= ?"
        ))
        .bind(self.db.now())
        .fetch_one(self.db.pool())
        .await?;
        stats.expired_leases = expired.0;

        Ok(stats)
    }

    /// Put a `failed` row back in play with a fresh attempt budget.
    pub async fn requeue_failed(&self, id: i64) -> Result<QueueItem, QueueError> {
        let reset_span = if self.is_purge() {
            ", started_at = NULL, finished_at = NULL"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE {} SET status = 'pending', attempts = 0, next_run_at = ?1, \
             locked_until = NULL, claim_token = NULL, updated_at = ?1{reset_span} \
             WHERE id = ?2 AND status = 'failed' RETURNING *",
            self.table()
        );

        let requeued = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(self.db.now())
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        match requeued {
            Some(item) => {
                info!(queue = %self.kind, id, event_id = %item.event_id, "Failed work item requeued");
                Ok(item)
            }
            None => {
                let current = self.get(id).await?;
                Err(QueueError::NotRequeueable {
                    queue: self.kind,
                    id,
                    status: current.status,
                })
            }
        }
    }

    /// Delete `done` rows last touched more than `older_than` ago.
    ///
    /// Failed rows are kept for operator review.
    pub async fn purge_finished(&self, older_than: Duration) -> Result<u64, QueueError> {
        let cutoff = self.db.now().saturating_sub(secs(older_than));
        let sql = format!(
            "DELETE FROM {} WHERE status = 'done' AND updated_at <= ?",
            self.table()
        );

        let result = sqlx::query(&sql)
            .bind(cutoff)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
