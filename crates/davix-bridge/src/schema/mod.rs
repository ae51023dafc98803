//! Bridge table definitions.
//!
//! Table names are resolved against a caller-supplied prefix and rendered to
//! DDL for either the plugin's MySQL install step or the embedded `SQLite`
//! store.

mod ddl;
mod tables;

pub use ddl::{Dialect, render_schema, render_table};
pub use tables::{SchemaError, Table, TableNames};
