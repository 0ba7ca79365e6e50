//! CLI subcommand implementations for the pagegrab binary.

pub mod fetch_cmd;
pub mod screenshot_cmd;

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--log-level` (or `debug` with
/// `--verbose`) applies to the pagegrab crate.
pub fn init_tracing(verbose: bool, log_level: Option<&str>) {
    let level = match (log_level, verbose) {
        (Some(level), _) => level,
        (None, true) => "debug",
        (None, false) => "warn",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("pagegrab={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
