//! Physical table names.

use std::fmt;

/// The five bridge tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Keys,
    Logs,
    ProvisionQueue,
    PurgeQueue,
    User,
}

impl Table {
    /// Install order.
    pub const ALL: [Self; 5] = [
        Self::Keys,
        Self::Logs,
        Self::ProvisionQueue,
        Self::PurgeQueue,
        Self::User,
    ];

    /// Unprefixed table name.
    pub const fn base_name(self) -> &'static str {
        match self {
            Self::Keys => "davix_bridge_keys",
            Self::Logs => "davix_bridge_logs",
            Self::ProvisionQueue => "davix_bridge_provision_queue",
            Self::PurgeQueue => "davix_bridge_purge_queue",
            Self::User => "davix_bridge_user",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_name())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Invalid table prefix {0:?}: only ASCII letters, digits and '_' are allowed")]
    InvalidPrefix(String),
}

/// Table names resolved against a prefix.
///
/// The prefix is interpolated into DDL and queries, so it is restricted to
/// `[A-Za-z0-9_]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    prefix: String,
    keys: String,
    logs: String,
    provision_queue: String,
    purge_queue: String,
    user: String,
}

impl TableNames {
    pub fn new(prefix: &str) -> Result<Self, SchemaError> {
        if !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(SchemaError::InvalidPrefix(prefix.to_string()));
        }
        Ok(Self::resolve(prefix))
    }

    fn resolve(prefix: &str) -> Self {
        let full = |table: Table| format!("{prefix}{}", table.base_name());
        Self {
            prefix: prefix.to_string(),
            keys: full(Table::Keys),
            logs: full(Table::Logs),
            provision_queue: full(Table::ProvisionQueue),
            purge_queue: full(Table::PurgeQueue),
            user: full(Table::User),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn name(&self, table: Table) -> &str {
        match table {
            Table::Keys => &self.keys,
            Table::Logs => &self.logs,
            Table::ProvisionQueue => &self.provision_queue,
            Table::PurgeQueue => &self.purge_queue,
            Table::User => &self.user,
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::resolve("wp_")
    }
}
