//! Tracing setup for the `geoprox` binary and tests.
//!
//! Output goes to stderr so `nearby --format json` and friends stay pipeable.
//! `RUST_LOG`, when set and parseable, wins over the CLI verbosity flags.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How chatty the process should be, from `-q` / `-v` / `-vv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Opens, sweeps and warnings.
    #[default]
    Normal,
    /// Individual index operations.
    Verbose,
    /// Per-query match counts.
    Trace,
}

impl Verbosity {
    /// Most detailed level emitted for `geoprox` targets.
    #[must_use]
    pub fn level(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::ERROR,
            Self::Normal => LevelFilter::INFO,
            Self::Verbose => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    /// Directive applied when `RUST_LOG` is absent.
    ///
    /// Other crates stay at `warn` (or `error` when quiet) so rusqlite or tokio internals never drown
    /// out index logs.
    #[must_use]
    pub fn directive(self) -> String {
        let level = match self {
            Self::Quiet => return "error".to_string(),
            Self::Normal => "info",
            Self::Verbose => "debug",
            Self::Trace => "trace",
        };
        format!("warn,geoprox={level}")
    }
}

/// Pick the filter: a valid `rust_log` value, else the verbosity default.
fn build_filter(verbosity: Verbosity, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(verbosity.directive()))
}

/// Install the global subscriber.
///
/// Calling this more than once is harmless; later calls are ignored.
///
/// ```no_run
/// use geoprox::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(verbosity, rust_log.as_deref());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init();
}

/// Subscriber for unit tests: warnings and errors, captured per test.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_increase_with_verbosity() {
        assert_eq!(Verbosity::Quiet.level(), LevelFilter::ERROR);
        assert_eq!(Verbosity::Normal.level(), LevelFilter::INFO);
        assert_eq!(Verbosity::Verbose.level(), LevelFilter::DEBUG);
        assert_eq!(Verbosity::Trace.level(), LevelFilter::TRACE);
        assert!(Verbosity::Trace.level() > Verbosity::Quiet.level());
    }

    #[test]
    fn test_default_is_normal() {
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_directive_scopes_to_crate() {
        assert_eq!(Verbosity::Quiet.directive(), "error");
        assert_eq!(Verbosity::Normal.directive(), "warn,geoprox=info");
        assert_eq!(Verbosity::Verbose.directive(), "warn,geoprox=debug");
    }

    #[test]
    fn test_rust_log_overrides_verbosity() {
        let filter = build_filter(Verbosity::Quiet, Some("geoprox=trace"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_missing_rust_log_uses_verbosity() {
        let filter = build_filter(Verbosity::Verbose, None);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logging(Verbosity::Normal);
        init_logging(Verbosity::Trace);
        init_test_logging();
    }
}
