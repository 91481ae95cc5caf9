//! Tracing and logging setup shared by every service binary and test.

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use tracing::{LogFormat, init, init_with_format};
