//! Queue subcommands: stats, failed, requeue, purge-done.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::Write;
use std::time::Duration;

use davix_core::config::QueueConfig;

use crate::queue::{QueueKind, QueueStatus, WorkQueue};
use crate::storage::BridgeDatabase;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Queue subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum QueueAction {
    /// Show row counts per status.
    Stats {
        /// provision or purge.
        queue: QueueKind,
    },
    /// List rows that exhausted their attempts.
    Failed {
        /// provision or purge.
        queue: QueueKind,
        /// Maximum rows to show.
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Put a failed row back to pending with a fresh attempt budget.
    Requeue {
        /// provision or purge.
        queue: QueueKind,
        /// Row id.
        id: i64,
    },
    /// Delete done rows older than the given age.
    PurgeDone {
        /// provision or purge.
        queue: QueueKind,
        #[arg(long)]
        older_than_days: u64,
    },
}

/// Execute a queue subcommand.
pub async fn run(
    action: QueueAction,
    db: &BridgeDatabase,
    config: &QueueConfig,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let open = |kind| WorkQueue::from_config(db.clone(), kind, config);
    match action {
        QueueAction::Stats { queue } => stats(&open(queue), out).await,
        QueueAction::Failed { queue, limit } => failed(&open(queue), limit, out).await,
        QueueAction::Requeue { queue, id } => {
            let item = open(queue).requeue_failed(id).await?;
            writeln!(out, "Requeued {queue} item {} ({})", item.id, item.event_id)?;
            Ok(())
        }
        QueueAction::PurgeDone {
            queue,
            older_than_days,
        } => {
            let age = Duration::from_secs(older_than_days.saturating_mul(SECS_PER_DAY));
            let removed = open(queue).purge_finished(age).await?;
            writeln!(out, "Removed {removed} done {queue} item(s)")?;
            Ok(())
        }
    }
}

async fn stats(queue: &WorkQueue, out: &mut impl Write) -> anyhow::Result<()> {
    let stats = queue.stats().await?;
    writeln!(out, "{} queue", queue.kind())?;
    writeln!(out, "  pending:        {}", stats.pending)?;
    writeln!(out, "  processing:     {}", stats.processing)?;
    writeln!(out, "  done:           {}", stats.done)?;
    writeln!(out, "  failed:         {}", stats.failed)?;
    writeln!(out, "  expired leases: {}", stats.expired_leases)?;
    Ok(())
}

async fn failed(queue: &WorkQueue, limit: u32, out: &mut impl Write) -> anyhow::Result<()> {
    let items = queue.list(Some(QueueStatus::Failed), limit).await?;
    if items.is_empty() {
        writeln!(out, "No failed {} items", queue.kind())?;
        return Ok(());
    }
    writeln!(out, "{:<8} {:<36} {:<8} ERROR", "ID", "EVENT", "ATTEMPTS")?;
    for item in &items {
        let error = item.last_error.as_deref().unwrap_or("");
        let first_line = error.lines().next().unwrap_or("");
        writeln!(
            out,
            "{:<8} {:<36} {:<8} {}",
            item.id, item.event_id, item.attempts, first_line
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QueueConfig {
        QueueConfig {
            max_attempts: 1,
            ..QueueConfig::default()
        }
    }

    async fn run_to_string(action: QueueAction, db: &BridgeDatabase) -> String {
        let mut out = Vec::new();
        run(action, db, &config(), &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    async fn failed_item(db: &BridgeDatabase) -> i64 {
        let queue = WorkQueue::from_config(db.clone(), QueueKind::Provision, &config());
        queue
            .enqueue("evt-1", &serde_json::json!({"user": 42}))
            .await
            .unwrap();
        let item = queue.claim_next("worker-a").await.unwrap().unwrap();
        let token = item.claim_token.unwrap();
        queue.fail(item.id, &token, "node api returned 502\nbody").await.unwrap();
        item.id
    }

    #[tokio::test]
    async fn stats_prints_counts() {
        let db = BridgeDatabase::open_in_memory().await.unwrap();
        failed_item(&db).await;

        let text = run_to_string(
            QueueAction::Stats {
                queue: QueueKind::Provision,
            },
            &db,
        )
        .await;
        assert!(text.starts_with("provision queue"));
        assert!(text.contains("failed:         1"));
        assert!(text.contains("pending:        0"));
    }

    #[tokio::test]
    async fn failed_lists_first_error_line() {
        let db = BridgeDatabase::open_in_memory().await.unwrap();
        failed_item(&db).await;

        let text = run_to_string(
            QueueAction::Failed {
                queue: QueueKind::Provision,
                limit: 10,
            },
            &db,
        )
        .await;
        assert!(text.contains("evt-1"));
        assert!(text.contains("node api returned 502"));
        assert!(!text.contains("body"));

        let empty = run_to_string(
            QueueAction::Failed {
                queue: QueueKind::Purge,
                limit: 10,
            },
            &db,
        )
        .await;
        assert_eq!(empty.trim(), "No failed purge items");
    }

    #[tokio::test]
    async fn requeue_resets_failed_row() {
        let db = BridgeDatabase::open_in_memory().await.unwrap();
        let id = failed_item(&db).await;

        let text = run_to_string(
            QueueAction::Requeue {
                queue: QueueKind::Provision,
                id,
            },
            &db,
        )
        .await;
        assert!(text.contains("evt-1"));

        let queue = WorkQueue::new(db.clone(), QueueKind::Provision);
        let item = queue.get(id).await.unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.attempts, 0);
    }

    #[tokio::test]
    async fn requeue_of_pending_row_is_an_error() {
        let db = BridgeDatabase::open_in_memory().await.unwrap();
        let queue = WorkQueue::new(db.clone(), QueueKind::Provision);
        let item = queue.enqueue("evt-1", "{}").await.unwrap();

        let mut out = Vec::new();
        let result = run(
            QueueAction::Requeue {
                queue: QueueKind::Provision,
                id: item.id,
            },
            &db,
            &config(),
            &mut out,
        )
        .await;
        assert!(result.is_err());
    }
}
