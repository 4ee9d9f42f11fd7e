//! Logging setup.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn";

/// Pick the filter directives: `RUST_LOG`, then `configured`, then "warn".
fn filter_directives(env: Option<String>, configured: Option<&str>) -> String {
    env.filter(|s| !s.trim().is_empty())
        .or_else(|| configured.map(str::to_owned))
        .unwrap_or_else(|| DEFAULT_FILTER.to_owned())
}

/// Install a stderr `fmt` subscriber.
///
/// Returns false if a global subscriber was already installed, in which case
/// nothing changes. Invalid directives fall back to "warn".
pub fn init(configured: Option<&str>) -> bool {
    let directives = filter_directives(std::env::var("RUST_LOG").ok(), configured);
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("caw: ignoring log filter {directives:?}: {e}");
        EnvFilter::new(DEFAULT_FILTER)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
