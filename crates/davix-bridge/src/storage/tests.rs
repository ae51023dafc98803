//! Storage layer tests for the license bridge.

use std::sync::Arc;
use std::time::Duration;

use davix_core::clock::ManualClock;

use super::db::{BridgeDatabase, DatabaseError};
use super::models::KeyFingerprint;
use super::queries_keys::KeyParams;
use super::queries_logs::LogParams;
use super::queries_user::{MappingParams, UpsertOutcome};
use super::MAX_ERROR_CHARS;

const T0: i64 = 1_750_000_000;

async fn test_db() -> (BridgeDatabase, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let db = BridgeDatabase::open_in_memory_with_clock(clock.clone())
        .await
        .unwrap();
    (db, clock)
}

fn key_params<'a>(subscription_id: &'a str, node_key: Option<&'a str>) -> KeyParams<'a> {
    KeyParams {
        wp_user_id: 42,
        customer_email: "alice@example.com",
        subscription_id,
        order_id: Some("1001"),
        plan_slug: "pro-monthly",
        status: "active",
        fingerprint: None,
        valid_from: Some(T0),
        valid_until: Some(T0 + 30 * 86_400),
        node_plan_id: Some("plan-pro"),
        node_api_key_id: node_key,
    }
}

// === License key tests ===

#[tokio::test]
async fn upsert_key_inserts_then_updates() {
    let (db, clock) = test_db().await;
    let fp = KeyFingerprint::from_plaintext("dvx_live_0123456789abcdef").unwrap();

    let mut params = key_params("sub-1", Some("nk-1"));
    params.fingerprint = Some(&fp);
    let created = db.upsert_key(&params).await.unwrap();
    assert_eq!(created.wp_user_id, 42);
    assert_eq!(created.key_prefix.as_deref(), Some("dvx_live"));
    assert_eq!(created.key_last4.as_deref(), Some("cdef"));
    assert_eq!(created.created_at, T0);

    clock.advance(10);
    let mut params = key_params("sub-1", None);
    params.status = "on-hold";
    let updated = db.upsert_key(&params).await.unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.status, "on-hold");
    // Omitted values keep what was stored
    assert_eq!(updated.key_last4.as_deref(), Some("cdef"));
    assert_eq!(updated.node_api_key_id.as_deref(), Some("nk-1"));
    assert_eq!(updated.created_at, T0);
    assert_eq!(updated.updated_at, T0 + 10);
}

#[tokio::test]
async fn node_api_key_id_maps_to_one_record() {
    let (db, _) = test_db().await;
    db.upsert_key(&key_params("sub-1", Some("nk-1")))
        .await
        .unwrap();

    let err = db
        .upsert_key(&key_params("sub-2", Some("nk-1")))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Conflict(_)), "got {err:?}");

    // Several records without a remote key are fine
    db.upsert_key(&key_params("sub-3", None)).await.unwrap();
    db.upsert_key(&key_params("sub-4", None)).await.unwrap();

    let found = db.find_key_by_node_id("nk-1").await.unwrap().unwrap();
    assert_eq!(found.subscription_id, "sub-1");
    assert!(db.find_key_by_node_id("nk-404").await.unwrap().is_none());
    assert_eq!(db.list_keys_for_user(42).await.unwrap().len(), 3);
}

#[tokio::test]
async fn record_key_action_truncates_error() {
    let (db, _) = test_db().await;
    let record = db.upsert_key(&key_params("sub-1", None)).await.unwrap();
    let long_error = "x".repeat(MAX_ERROR_CHARS + 500);

    assert!(
        db.record_key_action(record.id, "provision", Some(502), Some(&long_error))
            .await
            .unwrap()
    );
    assert!(!db.record_key_action(9999, "provision", None, None).await.unwrap());

    let record = db.get_key(42, "sub-1").await.unwrap().unwrap();
    assert_eq!(record.last_action.as_deref(), Some("provision"));
    assert_eq!(record.last_http_code, Some(502));
    assert_eq!(record.last_error.unwrap().chars().count(), MAX_ERROR_CHARS);
}

// === Audit log tests ===

#[tokio::test]
async fn logs_are_append_only_and_newest_first() {
    let (db, clock) = test_db().await;

    let entry = LogParams {
        event: "webhook.subscription_updated",
        subscription_id: Some("sub-1"),
        http_code: Some(200),
        ..LogParams::default()
    };
    let first = db.append_log(&entry).await.unwrap();
    clock.advance(1);
    // Same event twice is two rows
    let second = db.append_log(&entry).await.unwrap();
    assert_ne!(first, second);

    db.append_log(&LogParams {
        event: "purge.requested",
        subscription_id: Some("sub-2"),
        ..LogParams::default()
    })
    .await
    .unwrap();

    let sub1 = db.list_logs(Some("sub-1"), 10).await.unwrap();
    assert_eq!(sub1.len(), 2);
    assert_eq!(sub1[0].id, second);
    assert_eq!(sub1[0].http_code, Some(200));

    assert_eq!(db.list_logs(None, 10).await.unwrap().len(), 3);
    assert_eq!(db.list_logs(None, 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn prune_logs_removes_only_old_entries() {
    let (db, clock) = test_db().await;
    db.append_log(&LogParams {
        event: "old",
        ..LogParams::default()
    })
    .await
    .unwrap();

    clock.advance(10 * 86_400);
    db.append_log(&LogParams {
        event: "new",
        ..LogParams::default()
    })
    .await
    .unwrap();

    let removed = db
        .prune_logs(Duration::from_secs(5 * 86_400))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let remaining = db.list_logs(None, 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].event, "new");
}

// === User mapping tests ===

fn mapping(status: &str, updated_at: i64) -> MappingParams<'_> {
    MappingParams {
        wp_user_id: 42,
        customer_email: Some("alice@example.com"),
        subscription_id: "sub-1",
        plan_slug: Some("pro-monthly"),
        status,
        valid_from: None,
        valid_until: Some(T0 + 86_400),
        source: "webhook",
        updated_at,
        last_sync_at: Some(updated_at),
    }
}

#[tokio::test]
async fn user_mapping_last_write_wins() {
    let (db, _) = test_db().await;

    assert_eq!(
        db.upsert_user_mapping(&mapping("active", T0)).await.unwrap(),
        UpsertOutcome::Applied
    );
    assert_eq!(
        db.upsert_user_mapping(&mapping("cancelled", T0 + 5))
            .await
            .unwrap(),
        UpsertOutcome::Applied
    );
    // An older write arriving late is ignored
    assert_eq!(
        db.upsert_user_mapping(&mapping("active", T0 + 1))
            .await
            .unwrap(),
        UpsertOutcome::Stale
    );

    let current = db.get_user_mapping(42, "sub-1").await.unwrap().unwrap();
    assert_eq!(current.status, "cancelled");
    assert_eq!(current.updated_at, T0 + 5);
    assert_eq!(db.list_user_mappings(42).await.unwrap().len(), 1);
}

#[tokio::test]
async fn mappings_synced_before_cutoff() {
    let (db, _) = test_db().await;
    db.upsert_user_mapping(&mapping("active", T0)).await.unwrap();

    let mut never_synced = mapping("active", T0);
    never_synced.subscription_id = "sub-2";
    never_synced.last_sync_at = None;
    db.upsert_user_mapping(&never_synced).await.unwrap();

    let mut fresh = mapping("active", T0 + 100);
    fresh.subscription_id = "sub-3";
    db.upsert_user_mapping(&fresh).await.unwrap();

    let stale = db.list_mappings_synced_before(T0 + 50).await.unwrap();
    let subs: Vec<_> = stale.iter().map(|m| m.subscription_id.as_str()).collect();
    assert_eq!(subs, vec!["sub-2", "sub-1"]);
}
