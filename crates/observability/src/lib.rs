//! Tracing and logging setup shared by the warden binaries.

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (format, filter).
pub mod tracing;

pub use self::tracing::{LogFormat, LogSettings};
