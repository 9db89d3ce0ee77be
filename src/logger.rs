//! Centralized logging configuration for guided-projection binaries and benches
//!
//! Installs a `tracing` subscriber with a default INFO level and the same
//! compact format across every executable.

use tracing::{Level, debug};

/// Initialize the tracing subscriber with the standard configuration
///
/// Default log level: INFO (overrideable via RUST_LOG environment variable)
///
/// # Example
/// ```no_run
/// use guided_projection::init_logger;
///
/// init_logger();
/// tracing::info!("Application started");
/// ```
///
/// # Environment Variables
/// ```bash
/// RUST_LOG=debug cargo run --bin guided_projection_demo
/// RUST_LOG=guided_projection=trace cargo run --bin guided_projection_demo
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Initialize the tracing subscriber with a custom default level
///
/// Per-iteration tables are logged at DEBUG, so pass `Level::DEBUG` to see them.
pub fn init_logger_with_level(default_level: Level) {
    use tracing_subscriber::fmt::time::SystemTime;

    // a second call (several benches in one process) keeps the first subscriber
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_timer(SystemTime)
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
    if let Err(e) = installed {
        debug!("Logger already initialized: {}", e);
    }
}
