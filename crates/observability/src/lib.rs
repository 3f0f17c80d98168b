//! Process-wide logging setup shared by every goodstock binary and test harness.

pub mod tracing;

pub use tracing::LogFormat;

/// Initialize tracing/logging with the format picked from `GOODSTOCK_LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
