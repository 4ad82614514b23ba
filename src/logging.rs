//! Unified logging for diagnostic output.
//!
//! Provides compact timestamped logging with per-module level configuration.
//! Supports `RUST_LOG` environment variable for runtime overrides. Logs go to
//! stderr; stdout carries the conflicts.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "warn"  # quiet by default
//!
//! [logging.modules]
//! "ilignore::pipeline" = "debug"
//! ```
//!
//! # Environment Variable
//!
//! `RUST_LOG` takes precedence over config and CLI flags:
//! ```bash
//! RUST_LOG=debug ilignore check --staged
//! RUST_LOG=ilignore::pipeline::stages::dispatch=trace ilignore check -i "git ls-files"
//! ```

use std::fmt::Write as _;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Parse a level name the way `--log` accepts it: case-insensitive
/// `error`, `warn`, `info`, `debug` or `trace`.
pub fn parse_level(value: &str) -> Option<Level> {
    value.trim().parse::<Level>().ok()
}

/// Apply the CLI flags to `config`. `--log` wins over `--verbose`.
///
/// Returns the rejected `--log` value, if any, so the caller can report it
/// once logging is up.
pub fn apply_cli_level(
    config: LoggingConfig,
    verbose: bool,
    log: Option<&str>,
) -> (LoggingConfig, Option<String>) {
    let config = if verbose {
        config.with_level("info")
    } else {
        config
    };
    match log {
        Some(value) => match parse_level(value) {
            Some(level) => (config.with_level(level.as_str().to_ascii_lowercase()), None),
            None => (config, Some(value.to_string())),
        },
        None => (config, None),
    }
}

fn filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.default.clone();
    for (module, level) in &config.modules {
        let _ = write!(filter_str, ",{module}={level}");
    }
    filter_str
}

/// Initialize logging with configuration.
///
/// Call once at startup. Safe to call multiple times (only first call takes effect).
///
/// Log levels control visibility:
/// - `error` - errors only (quietest)
/// - `warn` - errors + warnings (default, quiet operation)
/// - `info` - normal operation logs
/// - `debug` - detailed debugging
/// - `trace` - everything
///
/// The `RUST_LOG` environment variable takes precedence over config settings.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        // RUST_LOG env var takes precedence over config
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}
