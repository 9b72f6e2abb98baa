//! Tracing and logging setup shared by the binaries.

pub mod tracing;

pub use crate::tracing::{LogConfig, LogFormat, LogFormatError};

/// Initialize process-wide logging from the environment (`RUST_LOG`,
/// `SHOPKEEP_LOG_FORMAT`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    crate::tracing::init(&LogConfig::from_env());
}
