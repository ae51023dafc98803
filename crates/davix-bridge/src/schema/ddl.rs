//! Table definitions and DDL rendering.
//!
//! Each table is described once as a list of typed columns and indexes and
//! rendered for two targets: MySQL, which is what the WordPress plugin feeds to
//! its install step (with `charset_collate` appended), and `SQLite`, which
//! backs the embedded store. Timestamps are `DATETIME` in MySQL and Unix
//! seconds (`INTEGER`) in `SQLite`.

use std::fmt::Write;
use std::str::FromStr;

use super::tables::{Table, TableNames};

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown dialect '{other}' (expected mysql or sqlite)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    /// Auto-increment primary key.
    Id,
    /// WordPress user ids.
    UnsignedBigInt,
    Int,
    SmallInt,
    Varchar(u16),
    Text,
    LongText,
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
enum ColumnDefault {
    Int(i64),
    Str(&'static str),
}

#[derive(Debug, Clone, Copy)]
struct Column {
    name: &'static str,
    ty: ColumnType,
    nullable: bool,
    default: Option<ColumnDefault>,
}

const fn required(name: &'static str, ty: ColumnType) -> Column {
    Column {
        name,
        ty,
        nullable: false,
        default: None,
    }
}

const fn optional(name: &'static str, ty: ColumnType) -> Column {
    Column {
        name,
        ty,
        nullable: true,
        default: None,
    }
}

const fn defaulted(name: &'static str, ty: ColumnType, default: ColumnDefault) -> Column {
    Column {
        name,
        ty,
        nullable: false,
        default: Some(default),
    }
}

#[derive(Debug, Clone, Copy)]
struct Index {
    name: &'static str,
    unique: bool,
    columns: &'static [&'static str],
}

const fn unique(name: &'static str, columns: &'static [&'static str]) -> Index {
    Index {
        name,
        unique: true,
        columns,
    }
}

const fn key(name: &'static str, columns: &'static [&'static str]) -> Index {
    Index {
        name,
        unique: false,
        columns,
    }
}

use ColumnType::{Id, Int, LongText, SmallInt, Text, Timestamp, UnsignedBigInt, Varchar};

// Emails and subscription ids stay within 191 characters so utf8mb4 indexes
// fit the InnoDB key length limit.
const ID: Column = required("id", Id);
const CREATED_AT: Column = required("created_at", Timestamp);
const UPDATED_AT: Column = required("updated_at", Timestamp);

const KEYS_COLUMNS: &[Column] = &[
    ID,
    required("wp_user_id", UnsignedBigInt),
    required("customer_email", Varchar(190)),
    required("subscription_id", Varchar(191)),
    optional("order_id", Varchar(64)),
    required("plan_slug", Varchar(100)),
    required("status", Varchar(32)),
    optional("key_prefix", Varchar(16)),
    optional("key_last4", Varchar(4)),
    optional("valid_from", Timestamp),
    optional("valid_until", Timestamp),
    optional("node_plan_id", Varchar(64)),
    optional("node_api_key_id", Varchar(64)),
    optional("last_action", Varchar(64)),
    optional("last_http_code", SmallInt),
    optional("last_error", Text),
    CREATED_AT,
    UPDATED_AT,
];

const KEYS_INDEXES: &[Index] = &[
    unique("user_subscription", &["wp_user_id", "subscription_id"]),
    unique("node_api_key_id", &["node_api_key_id"]),
    key("customer_email", &["customer_email"]),
    key("status", &["status"]),
];

const LOGS_COLUMNS: &[Column] = &[
    ID,
    required("event", Varchar(64)),
    optional("wp_user_id", UnsignedBigInt),
    optional("customer_email", Varchar(190)),
    optional("subscription_id", Varchar(191)),
    optional("order_id", Varchar(64)),
    optional("response_action", Varchar(64)),
    optional("http_code", SmallInt),
    optional("error_excerpt", Text),
    CREATED_AT,
];

const LOGS_INDEXES: &[Index] = &[
    key("subscription_id", &["subscription_id"]),
    key("event", &["event"]),
    key("created_at", &["created_at"]),
];

const QUEUE_COLUMNS: &[Column] = &[
    ID,
    required("event_id", Varchar(191)),
    required("payload", LongText),
    defaulted("status", Varchar(20), ColumnDefault::Str("pending")),
    defaulted("attempts", Int, ColumnDefault::Int(0)),
    required("next_run_at", Timestamp),
    optional("locked_until", Timestamp),
    optional("claim_token", Varchar(191)),
    optional("last_error", Text),
    CREATED_AT,
    UPDATED_AT,
];

const PURGE_EXTRA_COLUMNS: &[Column] = &[
    optional("wp_user_id", UnsignedBigInt),
    optional("customer_email", Varchar(190)),
    optional("subscription_id", Varchar(191)),
    optional("node_api_key_id", Varchar(64)),
    defaulted("reason", Varchar(64), ColumnDefault::Str("unspecified")),
    optional("started_at", Timestamp),
    optional("finished_at", Timestamp),
];

const QUEUE_INDEXES: &[Index] = &[
    unique("event_id", &["event_id"]),
    key("status_next_run", &["status", "next_run_at"]),
    key("locked_until", &["locked_until"]),
];

const PURGE_EXTRA_INDEXES: &[Index] = &[
    key("wp_user_id", &["wp_user_id"]),
    key("subscription_id", &["subscription_id"]),
];

const USER_COLUMNS: &[Column] = &[
    ID,
    required("wp_user_id", UnsignedBigInt),
    optional("customer_email", Varchar(190)),
    required("subscription_id", Varchar(191)),
    optional("plan_slug", Varchar(100)),
    required("status", Varchar(32)),
    optional("valid_from", Timestamp),
    optional("valid_until", Timestamp),
    optional("last_sync_at", Timestamp),
    defaulted("source", Varchar(32), ColumnDefault::Str("keys")),
    CREATED_AT,
    UPDATED_AT,
];

const USER_INDEXES: &[Index] = &[
    unique("user_subscription", &["wp_user_id", "subscription_id"]),
    key("last_sync_at", &["last_sync_at"]),
];

fn columns(table: Table) -> Vec<Column> {
    match table {
        Table::Keys => KEYS_COLUMNS.to_vec(),
        Table::Logs => LOGS_COLUMNS.to_vec(),
        Table::ProvisionQueue => QUEUE_COLUMNS.to_vec(),
        Table::PurgeQueue => QUEUE_COLUMNS
            .iter()
            .chain(PURGE_EXTRA_COLUMNS)
            .copied()
            .collect(),
        Table::User => USER_COLUMNS.to_vec(),
    }
}

fn indexes(table: Table) -> Vec<Index> {
    match table {
        Table::Keys => KEYS_INDEXES.to_vec(),
        Table::Logs => LOGS_INDEXES.to_vec(),
        Table::ProvisionQueue => QUEUE_INDEXES.to_vec(),
        Table::PurgeQueue => QUEUE_INDEXES
            .iter()
            .chain(PURGE_EXTRA_INDEXES)
            .copied()
            .collect(),
        Table::User => USER_INDEXES.to_vec(),
    }
}

fn column_sql(column: &Column, dialect: Dialect) -> String {
    let ty = match (dialect, column.ty) {
        (Dialect::MySql, Id) => "BIGINT UNSIGNED NOT NULL AUTO_INCREMENT".to_string(),
        (Dialect::Sqlite, Id) => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        (Dialect::MySql, UnsignedBigInt) => "BIGINT UNSIGNED".to_string(),
        (Dialect::MySql, Int) => "INT".to_string(),
        (Dialect::MySql, SmallInt) => "SMALLINT".to_string(),
        (Dialect::MySql, Varchar(len)) => format!("VARCHAR({len})"),
        (Dialect::MySql, Text) => "TEXT".to_string(),
        (Dialect::MySql, LongText) => "LONGTEXT".to_string(),
        (Dialect::MySql, Timestamp) => "DATETIME".to_string(),
        (Dialect::Sqlite, UnsignedBigInt | Int | SmallInt | Timestamp) => "INTEGER".to_string(),
        (Dialect::Sqlite, Varchar(_) | Text | LongText) => "TEXT".to_string(),
    };

    let mut sql = format!("{} {ty}", column.name);
    if column.ty == Id {
        return sql;
    }
    sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
    match column.default {
        Some(ColumnDefault::Int(v)) => {
            let _ = write!(sql, " DEFAULT {v}");
        }
        Some(ColumnDefault::Str(v)) => {
            let _ = write!(sql, " DEFAULT '{v}'");
        }
        None => {}
    }
    sql
}

fn render_mysql(table: Table, name: &str, charset_collate: &str) -> String {
    let mut lines: Vec<String> = columns(table)
        .iter()
        .map(|c| format!("  {}", column_sql(c, Dialect::MySql)))
        .collect();
    // Two spaces after PRIMARY KEY: dbDelta parses the definition verbatim.
    lines.push("  PRIMARY KEY  (id)".to_string());
    for index in indexes(table) {
        let kind = if index.unique { "UNIQUE KEY" } else { "KEY" };
        lines.push(format!("  {kind} {} ({})", index.name, index.columns.join(", ")));
    }

    // Plain CREATE TABLE: dbDelta takes the word after it as the table name.
    let mut sql = format!("CREATE TABLE {name} (\n{}\n)", lines.join(",\n"));
    let charset_collate = charset_collate.trim();
    if !charset_collate.is_empty() {
        sql.push(' ');
        sql.push_str(charset_collate);
    }
    sql.push(';');
    sql
}

fn render_sqlite(table: Table, name: &str) -> Vec<String> {
    let lines: Vec<String> = columns(table)
        .iter()
        .map(|c| format!("  {}", column_sql(c, Dialect::Sqlite)))
        .collect();
    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {name} (\n{}\n);",
        lines.join(",\n")
    )];
    for index in indexes(table) {
        let kind = if index.unique { "UNIQUE INDEX" } else { "INDEX" };
        statements.push(format!(
            "CREATE {kind} IF NOT EXISTS {name}_{} ON {name} ({});",
            index.name,
            index.columns.join(", ")
        ));
    }
    statements
}

/// Render the statements that create one table (and, for `SQLite`, its
/// indexes).
pub fn render_table(
    dialect: Dialect,
    table: Table,
    names: &TableNames,
    charset_collate: &str,
) -> Vec<String> {
    let name = names.name(table);
    match dialect {
        Dialect::MySql => vec![render_mysql(table, name, charset_collate)],
        Dialect::Sqlite => render_sqlite(table, name),
    }
}

/// Render the whole schema in install order.
///
/// `charset_collate` is appended to MySQL tables and ignored for `SQLite`.
pub fn render_schema(dialect: Dialect, names: &TableNames, charset_collate: &str) -> Vec<String> {
    Table::ALL
        .iter()
        .flat_map(|&table| render_table(dialect, table, names, charset_collate))
        .collect()
}
