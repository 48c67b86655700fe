//! Logging setup. `tracing` spans carry structured context (`%peer`,
//! `id = new_id`, ...) through constructors rather than relying on
//! process-global state or a fixed per-component prefix.

use tracing_subscriber::EnvFilter;

pub fn init(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
