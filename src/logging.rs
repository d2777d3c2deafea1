use tracing_subscriber::EnvFilter;

/// Diagnostics go to stderr so stdout carries nothing but records.
/// `RUST_LOG` takes precedence over `--debug`.
pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
