//! Shared tracing/logging initialization.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter` (e.g. `"davix_bridge=info"`). All
/// log output goes to stderr, in JSON lines when `log_json` is set; stdout is
/// left to command output.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (json, plain) = if log_json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .init();
}

/// Build the default filter directive for a crate at the given level.
pub fn default_filter(crate_name: &str, level: &str) -> String {
    format!("{}={level}", crate_name.replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_normalises_crate_name() {
        assert_eq!(default_filter("davix-bridge", "debug"), "davix_bridge=debug");
    }

    #[test]
    fn default_filter_is_a_valid_directive() {
        let directive = default_filter("davix-bridge", "warn");
        assert!(EnvFilter::try_new(directive).is_ok());
    }
}
