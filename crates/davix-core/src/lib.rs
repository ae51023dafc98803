//! Davix Bridge Core Library
//!
//! Shared functionality for Davix Bridge components:
//! - `SQLite` pool helpers and the shared `DatabaseError`
//! - Injectable wall clock for lease arithmetic
//! - Configuration resolution and hierarchy
//! - Tracing initialisation

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
