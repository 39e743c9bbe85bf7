//! Logging infrastructure for avprep workers.
//!
//! This module provides:
//! - A per-shard logger with file + callback dual output
//! - Compact mode with progress filtering
//! - Tail buffer for failure diagnosis
//! - Integration with the `tracing` ecosystem
//!
//! # Example
//!
//! ```no_run
//! use avprep_core::logging::{LogConfig, ShardLogger};
//!
//! let logger = ShardLogger::new("shard-0-of-4", "/path/to/logs", LogConfig::default(), None)
//!     .unwrap();
//!
//! logger.phase("Crop");
//! logger.info("Processing 120 clips");
//! logger.progress(50);
//! logger.success("Shard completed");
//! ```

mod shard_logger;
mod types;

pub use shard_logger::{ShardLogger, ShardLoggerBuilder};
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// This sets up a subscriber that:
/// - Respects the RUST_LOG environment variable
/// - Falls back to the provided default level
/// - Outputs to stderr
///
/// Should be called once at startup. Later calls are ignored.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_to_filter_works() {
        init_test_tracing();
        assert_eq!(LogLevel::Debug.as_filter_str(), "debug");
        assert_eq!(LogLevel::Info.as_filter_str(), "info");
    }
}
