//! Tracing/logging initialization.
//!
//! Ledger code only emits `tracing` events; choosing where they go is the
//! binary's job.

use tracing_subscriber::EnvFilter;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line (services, log shippers).
    #[default]
    Json,
    /// Human-readable single-line output (interactive CLI use).
    Compact,
}

/// Initialize tracing with `RUST_LOG`, falling back to `info`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(format: LogFormat) {
    init_with_filter(format, "info");
}

/// Initialize tracing with `RUST_LOG`, falling back to `default_directive`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_with_filter(format: LogFormat, default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Compact => builder.compact().with_target(true).try_init(),
    };
    result.is_ok()
}
