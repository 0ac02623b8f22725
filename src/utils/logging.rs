//! Diagnostic logging setup.
//!
//! Logging is off unless `XANG_LOG` (or `RUST_LOG`) holds a filter directive,
//! e.g. `XANG_LOG=xang=debug`. Output goes to stderr, or to `log_file` when
//! given, so it never mixes with command output on stdout.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "XANG_LOG";
const FALLBACK_ENV_VAR: &str = "RUST_LOG";

/// Filter directive from the environment; `off` when neither variable is set.
pub fn filter_directive<E>(env: E) -> String
where
    E: Fn(&str) -> Option<String>,
{
    [LOG_ENV_VAR, FALLBACK_ENV_VAR]
        .into_iter()
        .filter_map(|name| env(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| "off".to_string())
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid, the log file cannot
/// be opened, or a global subscriber has already been set.
pub fn init_tracing(log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let directive = filter_directive(|name| std::env::var(name).ok());
    let env_filter = EnvFilter::try_new(&directive)?;

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        None => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}
