//! Structured logging setup.
//!
//! Everything logs through `tracing` with structured fields (`user_id`,
//! `connection_id`, `online`, ...). [`init_subscriber`] wires the process-wide
//! subscriber; [`test_utils::capture_logs`] gives tests a thread-local view
//! of emitted events.

pub mod test_utils;

pub use test_utils::{CapturedLogs, capture_logs};

/// Install the global stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (e.g. `"info"`,
/// `"courier_core=debug"`) is used. Later calls are no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

/// Same as [`init_subscriber`] but emits one JSON object per line.
pub fn init_json_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}
