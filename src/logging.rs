//! Tracing subscriber setup for binaries, demos and tests

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber filtered by `RUST_LOG`
///
/// `default_directive` (e.g. `"tiered_cache=debug"`) applies when `RUST_LOG`
/// is unset or unparsable. Returns `false` if a global subscriber was
/// already installed, so it is safe to call from every test.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_existing_subscriber() {
        init_tracing("tiered_cache=debug");
        assert!(!init_tracing("tiered_cache=debug"));
    }
}
