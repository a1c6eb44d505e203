//! Structured logging setup.
//!
//! All crates log through `tracing` macros with structured fields. The
//! binary installs one global subscriber at startup via [`init_subscriber`].

use tracing_subscriber::EnvFilter;

/// Default level when neither `RUST_LOG` nor configuration set one.
pub const DEFAULT_LEVEL: &str = "info";

/// Build the filter: `RUST_LOG` wins, otherwise `level`.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already set
    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("debug");
        init_subscriber("info");
    }

    #[test]
    fn invalid_level_falls_back() {
        let filter = build_filter("not a [valid filter");
        assert!(!filter.to_string().is_empty());
    }
}
