//! Data models for bridge storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Local record of a license key issued for a subscription.
///
/// Only the key's prefix and last four characters are stored.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LicenseKeyRecord {
    pub id: i64,
    pub wp_user_id: i64,
    pub customer_email: String,
    pub subscription_id: String,
    pub order_id: Option<String>,
    pub plan_slug: String,
    pub status: String,
    pub key_prefix: Option<String>,
    pub key_last4: Option<String>,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    pub node_plan_id: Option<String>,
    pub node_api_key_id: Option<String>,
    pub last_action: Option<String>,
    pub last_http_code: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogEntry {
    pub id: i64,
    pub event: String,
    pub wp_user_id: Option<i64>,
    pub customer_email: Option<String>,
    pub subscription_id: Option<String>,
    pub order_id: Option<String>,
    pub response_action: Option<String>,
    pub http_code: Option<i64>,
    pub error_excerpt: Option<String>,
    pub created_at: i64,
}

/// Lifecycle state of a queue row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl QueueStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// No further transitions happen without operator action.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown queue status '{other}'")),
        }
    }
}

/// A row of either queue table.
///
/// The purge-only columns are absent from the provisioning queue and load as
/// `None` there.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueItem {
    pub id: i64,
    pub event_id: String,
    pub payload: String,
    pub status: QueueStatus,
    pub attempts: i64,
    pub next_run_at: i64,
    pub locked_until: Option<i64>,
    pub claim_token: Option<String>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[sqlx(default)]
    pub wp_user_id: Option<i64>,
    #[sqlx(default)]
    pub customer_email: Option<String>,
    #[sqlx(default)]
    pub subscription_id: Option<String>,
    #[sqlx(default)]
    pub node_api_key_id: Option<String>,
    #[sqlx(default)]
    pub reason: Option<String>,
    #[sqlx(default)]
    pub started_at: Option<i64>,
    #[sqlx(default)]
    pub finished_at: Option<i64>,
}

impl QueueItem {
    /// Decode the payload as JSON.
    pub fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    /// Whether a lease is held at `now`.
    pub fn is_leased_at(&self, now: i64) -> bool {
        self.status == QueueStatus::Processing && self.locked_until.is_some_and(|t| t > now)
    }
}

/// Denormalized per-user view of license state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserLicenseMapping {
    pub id: i64,
    pub wp_user_id: i64,
    pub customer_email: Option<String>,
    pub subscription_id: String,
    pub plan_slug: Option<String>,
    pub status: String,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    pub last_sync_at: Option<i64>,
    pub source: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Displayable, storable part of a license key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFingerprint {
    pub prefix: String,
    pub last4: String,
}

impl KeyFingerprint {
    const PREFIX_LEN: usize = 8;
    const MIN_KEY_LEN: usize = 16;

    /// Derive the fingerprint of a plaintext key. The key itself is dropped.
    ///
    /// Returns `None` for keys shorter than 16 characters, where prefix and
    /// suffix together would reveal most of the key.
    pub fn from_plaintext(key: &str) -> Option<Self> {
        let chars: Vec<char> = key.trim().chars().collect();
        if chars.len() < Self::MIN_KEY_LEN {
            return None;
        }
        Some(Self {
            prefix: chars[..Self::PREFIX_LEN].iter().collect(),
            last4: chars[chars.len() - 4..].iter().collect(),
        })
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}...{}", self.prefix, self.last4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_keeps_only_edges() {
        let fp = KeyFingerprint::from_plaintext("dvx_live_0123456789abcdef").unwrap();
        assert_eq!(fp.prefix, "dvx_live");
        assert_eq!(fp.last4, "cdef");
        assert_eq!(fp.to_string(), "dvx_live...cdef");
    }

    #[test]
    fn short_keys_have_no_fingerprint() {
        assert!(KeyFingerprint::from_plaintext("short-key").is_none());
        assert!(KeyFingerprint::from_plaintext("   ").is_none());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Done,
            QueueStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<QueueStatus>(), Ok(status));
        }
        assert!("retrying".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn lease_is_held_only_while_processing_and_unexpired() {
        let mut item = QueueItem {
            id: 1,
            event_id: "evt-1".into(),
            payload: "{}".into(),
            status: QueueStatus::Processing,
            attempts: 0,
            next_run_at: 0,
            locked_until: Some(100),
            claim_token: Some("w:t".into()),
            last_error: None,
            created_at: 0,
            updated_at: 0,
            wp_user_id: None,
            customer_email: None,
            subscription_id: None,
            node_api_key_id: None,
            reason: None,
            started_at: None,
            finished_at: None,
        };
        assert!(item.is_leased_at(99));
        assert!(!item.is_leased_at(100));
        item.status = QueueStatus::Done;
        assert!(!item.is_leased_at(50));
    }
}
