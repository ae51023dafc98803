//! Davix Bridge Library
//!
//! Persistence layer for the license bridge:
//! - Prefixed table schema with MySQL and `SQLite` renderings
//! - `SQLite` storage for license key records, audit logs and the user
//!   license read-model
//! - Claim-based provisioning and purge queues with leases and retry backoff
//! - Reconciliation of the read-model against key records
//! - Operator subcommands used by the `davix-bridge` binary

pub mod logs_cmd;
pub mod queue;
pub mod queue_cmd;
pub mod reconcile;
pub mod reconcile_cmd;
pub mod schema;
pub mod schema_cmd;
pub mod storage;
