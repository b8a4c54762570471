use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset. sqlx statement logging is noisy
/// at info, so it is held back to warnings.
const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Initialize structured logging for the workflow manager.
///
/// Call once at startup, before the config is read, so configuration errors
/// are logged too.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Logging initialized ({} {})", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
}
