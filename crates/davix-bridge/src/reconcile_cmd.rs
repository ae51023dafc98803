//! Reconcile subcommand: sync the user read-model and report staleness.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::Write;
use std::time::Duration;

use davix_core::config::ReconcileConfig;

use crate::reconcile::Reconciler;
use crate::storage::BridgeDatabase;

#[derive(clap::Args, Debug)]
pub struct ReconcileArgs {
    /// Report mappings not synced within this many seconds; defaults to the
    /// configured staleness bound.
    #[arg(long)]
    pub stale_secs: Option<u64>,
}

/// Run one reconciliation pass, then list mappings that are still stale.
pub async fn run(
    args: &ReconcileArgs,
    db: &BridgeDatabase,
    config: &ReconcileConfig,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let reconciler = Reconciler::new(db.clone());
    let report = reconciler.reconcile_all().await?;
    writeln!(
        out,
        "Synced {} mapping(s), {} skipped as older than stored data",
        report.synced, report.stale_writes
    )?;

    let bound = Duration::from_secs(args.stale_secs.unwrap_or(config.staleness_bound_secs));
    let stale = reconciler.stale_mappings(bound).await?;
    if stale.is_empty() {
        writeln!(out, "No stale mappings")?;
        return Ok(());
    }
    writeln!(out, "{} stale mapping(s):", stale.len())?;
    for mapping in &stale {
        let synced = mapping
            .last_sync_at
            .map_or_else(|| "never".to_string(), |t| t.to_string());
        writeln!(
            out,
            "  user {} subscription {} status {} last sync {}",
            mapping.wp_user_id, mapping.subscription_id, mapping.status, synced
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyParams, MappingParams};

    #[tokio::test]
    async fn syncs_keys_and_reports_nothing_stale() {
        let db = BridgeDatabase::open_in_memory().await.unwrap();
        db.upsert_key(&KeyParams {
            wp_user_id: 3,
            customer_email: "carol@example.com",
            subscription_id: "sub-9",
            order_id: Some("order-1"),
            plan_slug: "pro",
            status: "active",
            fingerprint: None,
            valid_from: None,
            valid_until: None,
            node_plan_id: None,
            node_api_key_id: None,
        })
        .await
        .unwrap();

        let mut out = Vec::new();
        run(
            &ReconcileArgs { stale_secs: None },
            &db,
            &ReconcileConfig::default(),
            &mut out,
        )
        .await
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Synced 1 mapping(s)"));
        assert!(text.contains("No stale mappings"));
    }

    #[tokio::test]
    async fn never_synced_mapping_is_reported() {
        let db = BridgeDatabase::open_in_memory().await.unwrap();
        db.upsert_user_mapping(&MappingParams {
            wp_user_id: 4,
            customer_email: None,
            subscription_id: "sub-orphan",
            plan_slug: None,
            status: "active",
            valid_from: None,
            valid_until: None,
            source: "import",
            updated_at: db.now(),
            last_sync_at: None,
        })
        .await
        .unwrap();

        let mut out = Vec::new();
        run(
            &ReconcileArgs {
                stale_secs: Some(60),
            },
            &db,
            &ReconcileConfig::default(),
            &mut out,
        )
        .await
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Synced 0 mapping(s)"));
        assert!(text.contains("subscription sub-orphan status active last sync never"));
    }
}
