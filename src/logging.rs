use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `FILEKIT_LOG=filekit=debug`.
pub const LOG_ENV: &str = "FILEKIT_LOG";

/// Filter from [`LOG_ENV`], or `fallback` when it is unset or unparsable.
pub fn filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install a stderr fmt subscriber. Later calls are ignored.
pub fn init(verbose: bool) {
    let fallback = if verbose { "filekit=debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(fallback))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
