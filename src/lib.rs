pub mod config;
pub mod models;
pub mod providers;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for binaries and integration harnesses.
///
/// Respects `RUST_LOG` when set; otherwise falls back to the crate default.
/// Call once at process start.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} v{} tracing initialized", config::APP_NAME, config::APP_VERSION);
}
