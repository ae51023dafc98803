//! Errors raised while resolving Davix Bridge configuration.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An explicitly requested config file is absent.
    #[error("Config file {} does not exist", .0.display())]
    MissingConfig(PathBuf),

    #[error("Failed to read config file {}: {source}", .path.display())]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// An environment override could not be parsed.
    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}
