//! C11 — process-wide tracing initialization.
//!
//! Grounded on the teacher's `main.rs::init_tracing`: a filter string assembled from the
//! configured base level plus per-module overrides, and a formatter chosen by `logging.format`.

use config::LoggingConfig;

/// Initializes the global `tracing` subscriber. Must be called exactly once, before the listener
/// binds, so that every component's startup logging (including config warnings) is captured.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = config::build_filter_string(logging);

    match logging.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
    }
}
