// Tracing log adapter - Subscriber setup for structured logging

use tracing_subscriber::EnvFilter;

use crate::adapters::toml_config::LoggingSection;
use crate::error::{VidpressError, VidpressResult};

/// Build the filter for `level`, which may be a bare level or full directives
pub fn env_filter(level: &str) -> VidpressResult<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| VidpressError::Logging {
        message: format!("invalid log filter {:?}: {}", level, e),
    })
}

/// Install the global subscriber, writing to stderr.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(logging: &LoggingSection) -> VidpressResult<bool> {
    let filter = env_filter(&logging.level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if logging.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    Ok(installed)
}
