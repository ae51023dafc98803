//! Audit log subcommands.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::Write;
use std::time::Duration;

use davix_core::config::AuditConfig;

use crate::storage::BridgeDatabase;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(clap::Subcommand, Debug)]
pub enum LogsAction {
    /// Delete audit entries older than the retention window.
    Prune {
        /// Defaults to the configured retention.
        #[arg(long)]
        older_than_days: Option<u32>,
    },
    /// Show the most recent audit entries.
    Tail {
        /// Only entries for this subscription.
        #[arg(long)]
        subscription: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

pub async fn run(
    action: LogsAction,
    db: &BridgeDatabase,
    config: &AuditConfig,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match action {
        LogsAction::Prune { older_than_days } => {
            let days = older_than_days.unwrap_or(config.retention_days);
            let removed = db
                .prune_logs(Duration::from_secs(u64::from(days) * SECS_PER_DAY))
                .await?;
            writeln!(out, "Removed {removed} audit entr{}", if removed == 1 { "y" } else { "ies" })?;
        }
        LogsAction::Tail {
            subscription,
            limit,
        } => {
            let entries = db.list_logs(subscription.as_deref(), limit).await?;
            for entry in entries.iter().rev() {
                writeln!(
                    out,
                    "{} {:<24} {:<16} {:<6} {}",
                    entry.created_at,
                    entry.event,
                    entry.subscription_id.as_deref().unwrap_or("-"),
                    entry
                        .http_code
                        .map_or_else(|| "-".to_string(), |c| c.to_string()),
                    entry.error_excerpt.as_deref().unwrap_or("")
                )?;
            }
        }
    }
    Ok(())
}
