//! Logging setup and configuration

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Output layout of log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Timestamp, level, target and fields
    #[default]
    Full,
    /// Single dense line without targets
    Compact,
}

/// Setup tracing subscriber for the application
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    setup_logging_with(default_level, LogFormat::Full)
}

/// Setup tracing subscriber with an explicit output layout
pub fn setup_logging_with(default_level: &str, format: LogFormat) -> crate::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for(default_level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Full => registry.with(fmt::layer()).try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
    };

    installed.map_err(|e| crate::Error::Config(format!("Failed to install logger: {}", e)))
}

/// Build a filter from a bare level (`debug`) or a directive list
/// (`warn,zerousb=trace`)
pub fn filter_for(level: &str) -> crate::Result<EnvFilter> {
    let level = level.trim();
    if level.is_empty() {
        return Err(crate::Error::Config("Empty log filter".into()));
    }

    EnvFilter::try_new(level)
        .map_err(|e| crate::Error::Config(format!("Invalid log filter '{}': {}", level, e)))
}
