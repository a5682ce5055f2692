/// Structured logging setup using tracing
///
/// Logs never go to stdout: the CLI prints recommendation JSON there. Console logs go
/// to stderr, human-readable on a terminal and JSON otherwise. An optional log file
/// always receives JSON.

use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Dependencies that are chatty at info level.
const QUIET_TARGETS: &[&str] = &["sqlx=warn", "hyper=warn", "reqwest=warn", "h2=warn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleFormat {
    Pretty,
    Json,
}

impl ConsoleFormat {
    fn detect() -> Self {
        if std::io::stderr().is_terminal() {
            ConsoleFormat::Pretty
        } else {
            ConsoleFormat::Json
        }
    }
}

/// Filter directives for `level`: our own crate at `level`, noisy dependencies at warn.
fn filter_directives(level: &str) -> String {
    let level = level.trim();
    let level = if level.is_empty() { "info" } else { level };
    std::iter::once(level)
        .chain(QUIET_TARGETS.iter().copied())
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. RUST_LOG overrides `config.log_level` when set.
pub fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.log_level)));

    let file_layer = config.log_file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .json(),
            ),
            Err(e) => {
                eprintln!("Could not open log file {}: {} (logging to stderr only)", path, e);
                None
            }
        }
    });

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);
    match ConsoleFormat::detect() {
        ConsoleFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init(),
        ConsoleFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).json())
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_quiet_dependencies() {
        assert_eq!(filter_directives("debug"), "debug,sqlx=warn,hyper=warn,reqwest=warn,h2=warn");
        assert!(filter_directives("  ").starts_with("info,"));
        assert!(EnvFilter::try_new(filter_directives("jobmatch=trace")).is_ok());
    }
}
