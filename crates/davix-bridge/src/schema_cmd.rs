//! Schema subcommands: print DDL, install into the store.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::Write;

use davix_core::config::DatabaseConfig;

use crate::schema::{Dialect, Table, TableNames, render_schema};
use crate::storage::BridgeDatabase;

/// Options for `davix-bridge schema`.
#[derive(clap::Args, Debug)]
pub struct SchemaArgs {
    /// Target dialect (mysql or sqlite).
    #[arg(long, default_value = "mysql")]
    pub dialect: Dialect,

    /// Table prefix; defaults to the configured one.
    #[arg(long)]
    pub prefix: Option<String>,

    /// MySQL charset/collation clause; defaults to the configured one.
    #[arg(long)]
    pub charset_collate: Option<String>,
}

/// Write the `CREATE` statements for every bridge table.
pub fn print(args: &SchemaArgs, config: &DatabaseConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let prefix = args.prefix.as_deref().unwrap_or(&config.table_prefix);
    let charset_collate = args
        .charset_collate
        .as_deref()
        .unwrap_or(&config.charset_collate);
    let names = TableNames::new(prefix)?;

    for statement in render_schema(args.dialect, &names, charset_collate) {
        writeln!(out, "{statement}")?;
        writeln!(out)?;
    }
    Ok(())
}

/// Install the schema and list the tables it covers.
pub async fn migrate(db: &BridgeDatabase, out: &mut impl Write) -> anyhow::Result<()> {
    db.install_schema().await?;
    for table in Table::ALL {
        writeln!(out, "{}", db.table(table))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(args: &SchemaArgs) -> String {
        let mut out = Vec::new();
        print(args, &DatabaseConfig::default(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn defaults_come_from_config() {
        let text = render(&SchemaArgs {
            dialect: Dialect::MySql,
            prefix: None,
            charset_collate: None,
        });
        assert!(text.contains("CREATE TABLE wp_davix_bridge_keys ("));
        assert!(text.contains("utf8mb4_unicode_ci;\n"));
        assert!(!text.contains(";;"), "{text}");
        assert_eq!(text.matches("CREATE TABLE").count(), 5);
    }

    #[test]
    fn flags_override_config() {
        let text = render(&SchemaArgs {
            dialect: Dialect::Sqlite,
            prefix: Some("site2_".into()),
            charset_collate: Some("IGNORED".into()),
        });
        assert!(text.contains("site2_davix_bridge_purge_queue"));
        assert!(!text.contains("wp_davix"));
        assert!(!text.contains("IGNORED"));
        assert!(!text.contains(";;"));
        assert!(text.contains("CREATE INDEX IF NOT EXISTS"));
    }

    #[test]
    fn bad_prefix_is_rejected() {
        let mut out = Vec::new();
        let args = SchemaArgs {
            dialect: Dialect::MySql,
            prefix: Some("wp;drop".into()),
            charset_collate: None,
        };
        assert!(print(&args, &DatabaseConfig::default(), &mut out).is_err());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn migrate_lists_tables() {
        let db = BridgeDatabase::open_in_memory().await.unwrap();
        let mut out = Vec::new();
        migrate(&db, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.lines().all(|l| l.starts_with("wp_davix_bridge_")));
    }
}
