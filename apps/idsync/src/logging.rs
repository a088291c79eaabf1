//! Structured logging setup using tracing.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event, for log aggregation.
    Json,
}

/// Filter directive for the given level; `debug` forces debug output.
pub fn filter_directive(level: &str, debug: bool) -> String {
    if debug {
        "debug".to_string()
    } else if level.trim().is_empty() {
        "info".to_string()
    } else {
        level.trim().to_ascii_lowercase()
    }
}

/// Initialize the global subscriber. Logs go to stderr; stdout is reserved
/// for the run summary.
///
/// `RUST_LOG` takes precedence over `filter` when set. Returns an error if
/// the filter cannot be parsed or a subscriber is already installed.
pub fn init_logging(filter: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(filter))?;

    let registry = tracing_subscriber::registry().with(filter_layer);
    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(false)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?,
    }

    tracing::debug!(filter = %filter, format = ?format, "Logging initialized");
    Ok(())
}
