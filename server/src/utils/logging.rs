use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Setup tracing and logging. Release builds use JSON logs and default WARN level,
/// debug builds use readable logs and default INFO level. Levels can be set with `RUST_LOG`.
pub fn setup_logging() {
    let builder = tracing_subscriber::fmt();
    if cfg!(debug_assertions) {
        builder.with_env_filter(env_filter(LevelFilter::INFO)).init();
    } else {
        builder
            .with_env_filter(env_filter(LevelFilter::WARN))
            .json()
            .init();
    }
}

fn env_filter(default_level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_regex(false)
        .from_env_lossy()
}
