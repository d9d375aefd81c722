//! Tracing and logging setup shared by the binaries.

/// Initialize process-wide tracing/logging with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::Json);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use tracing::LogFormat;
