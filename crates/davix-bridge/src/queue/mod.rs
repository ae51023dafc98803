//! Claim-based durable work queues.
//!
//! Both the provisioning queue and the purge queue are tables of work items
//! that concurrent worker processes compete for. Mutual exclusion is a lease
//! on the row (`locked_until` + `claim_token`) taken and checked with single
//! conditional `UPDATE` statements; no in-process lock is involved, so
//! workers may live in different processes.
//!
//! ```text
//!            claim                  complete
//! pending ───────────▶ processing ───────────▶ done
//!    ▲                  │       ▲ │
//!    │   fail (retry)   │       └─┘ heartbeat, or reclaim after expiry
//!    └──────────────────┤
//!                       │ fail (attempts exhausted)
//!                       ▼
//!                     failed
//! ```
//!
//! Delivery is at-least-once: a worker that stalls past its lease can lose
//! the row to another worker, so processing must be idempotent by
//! `event_id`.

mod backoff;
mod store;


use std::fmt;
use std::str::FromStr;

use davix_core::db::DatabaseError;

use crate::schema::Table;
pub use crate::storage::{QueueItem, QueueStatus};

pub use backoff::{BackoffPolicy, ConstantBackoff, ExponentialBackoff};
pub use store::{PurgeSubject, QueueStats, WorkQueue};

/// Which queue table a [`WorkQueue`] operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Provision,
    Purge,
}

impl QueueKind {
    pub const fn table(self) -> Table {
        match self {
            Self::Provision => Table::ProvisionQueue,
            Self::Purge => Table::PurgeQueue,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Purge => "purge",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provision" => Ok(Self::Provision),
            "purge" => Ok(Self::Purge),
            other => Err(format!("unknown queue '{other}' (expected provision or purge)")),
        }
    }
}

/// Errors reported by queue operations.
///
/// An empty claim is not an error: [`WorkQueue::claim`] returns `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The event is already enqueued. Producers treat this as success.
    #[error("Event {event_id} is already enqueued")]
    DuplicateEvent { event_id: String },

    /// The caller no longer holds the lease on this row and must abandon the
    /// work.
    #[error("Lease lost on {queue} queue item {id}")]
    LeaseLost { queue: QueueKind, id: i64 },

    #[error("{queue} queue item {id} not found")]
    NotFound { queue: QueueKind, id: i64 },

    #[error("{queue} queue item {id} is {status}; only failed items can be requeued")]
    NotRequeueable {
        queue: QueueKind,
        id: i64,
        status: QueueStatus,
    },

    #[error("The {0} queue does not carry purge subjects")]
    Unsupported(QueueKind),

    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.into())
    }
}

impl QueueError {
    /// Persistence failures that may succeed if retried later.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Storage(DatabaseError::Connection(_) | DatabaseError::Query(_))
        )
    }
}
