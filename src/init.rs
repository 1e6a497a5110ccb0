use crate::env::ConfigError;
use crate::formatter::{Formatter, FormatterConfig};
use crate::layer::JsonFormat;
use crate::severity::SeverityHandle;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

/// Logging setup: formatter options plus the most verbose level that is
/// written at all.
///
/// **Fields**
/// - `format`: [`FormatterConfig`] used for every line.
/// - `max_level`: events more verbose than this are discarded before
///   formatting.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub format: FormatterConfig,
    pub max_level: LevelFilter,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: FormatterConfig::default(),
            max_level: LevelFilter::INFO,
        }
    }
}

/// Error type returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("invalid log format configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to set global subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install a global `tracing` subscriber that writes one JSON line per
/// event to stdout.
///
/// **Parameters**
/// - `config`: [`LoggingConfig`] with formatter options and level cap.
///
/// **Returns**
/// - The [`SeverityHandle`] of the installed formatter, so the severity
///   table can still be switched after installation.
/// - `Err(InitError::SetGlobalDefault)` if a global subscriber already exists.
pub fn init_json_logging_with_config(config: LoggingConfig) -> Result<SeverityHandle, InitError> {
    let format = JsonFormat::new(Formatter::new(config.format));
    let handle = format.formatter().severities().clone();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_writer(std::io::stdout)
        .with_filter(config.max_level);
    let subscriber = Registry::default().with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(handle)
}

/// Initialize JSON logging from the `LOG_FORMAT_*` environment variables.
///
/// Equivalent to [`init_json_logging_with_config`] with
/// [`FormatterConfig::from_env`] and the default level cap.
pub fn init_json_logging() -> Result<SeverityHandle, InitError> {
    let config = LoggingConfig {
        format: FormatterConfig::from_env()?,
        ..LoggingConfig::default()
    };
    init_json_logging_with_config(config)
}
