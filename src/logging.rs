//! Logging helpers.
//!
//! The crate emits `tracing` events at bind, execute, fetch and LOB I/O.
//! With the `logging` feature these helpers install a `tracing-subscriber`
//! formatter; without it they do nothing.

#[cfg(feature = "logging")]
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging at `info`, overridable through `RUST_LOG`.
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with a default level filter.
///
/// ```
/// oracle_dpi_rs::logging::init_with_level("oracle_dpi_rs=debug");
/// ```
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

/// Verbose logging routed through the test harness' output capture.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("oracle_dpi_rs=trace"))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
