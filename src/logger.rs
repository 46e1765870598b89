use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured level when both are present.
pub fn init_logging(level: &str) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => EnvFilter::new(level),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
