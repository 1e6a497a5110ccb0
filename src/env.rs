//! Environment variable names used by this crate for configuring the
//! formatter from a service's environment.
//!
//! These are purely helpers; [`Formatter`](crate::formatter::Formatter)
//! itself never reads the environment.

use crate::formatter::{FormatterConfig, TimestampFormat, TimestampKey};
use crate::severity::SeverityTable;

/// Severity table name: `fluentd`, `stackdriver` (or `gcp`), `legacy`.
pub const LOG_FORMAT_SEVERITY_TABLE_ENV: &str = "LOG_FORMAT_SEVERITY_TABLE";

/// Timestamp key: `timestamp` or the legacy `time`.
pub const LOG_FORMAT_TIMESTAMP_KEY_ENV: &str = "LOG_FORMAT_TIMESTAMP_KEY";

/// strftime pattern for the timestamp. Empty keeps RFC 3339 with nanoseconds.
pub const LOG_FORMAT_TIMESTAMP_FORMAT_ENV: &str = "LOG_FORMAT_TIMESTAMP_FORMAT";

/// `true`/`false`: emit caller location keys.
pub const LOG_FORMAT_REPORT_CALLER_ENV: &str = "LOG_FORMAT_REPORT_CALLER";

/// `true`/`false`: indent the JSON output.
pub const LOG_FORMAT_PRETTY_ENV: &str = "LOG_FORMAT_PRETTY";

/// Error type returned when building configuration from strings.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown severity table: {0}")]
    UnknownSeverityTable(String),

    #[error("unknown timestamp key: {0}")]
    UnknownTimestampKey(String),

    #[error("invalid boolean for {key}: {value}")]
    InvalidBool { key: String, value: String },
}

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl FormatterConfig {
    /// Build a config from the `LOG_FORMAT_*` environment variables.
    /// Unset variables keep their [`Default`] values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`FormatterConfig::from_env`] with an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = FormatterConfig::default();

        if let Some(table) = lookup(LOG_FORMAT_SEVERITY_TABLE_ENV) {
            config.severities = table.parse::<SeverityTable>()?.to_map();
        }
        if let Some(key) = lookup(LOG_FORMAT_TIMESTAMP_KEY_ENV) {
            config.timestamp_key = key.parse::<TimestampKey>()?;
        }
        if let Some(pattern) = lookup(LOG_FORMAT_TIMESTAMP_FORMAT_ENV) {
            if !pattern.is_empty() {
                config.timestamp_format = TimestampFormat::Custom(pattern);
            }
        }
        if let Some(v) = lookup(LOG_FORMAT_REPORT_CALLER_ENV) {
            config.report_caller = parse_bool(LOG_FORMAT_REPORT_CALLER_ENV, &v)?;
        }
        if let Some(v) = lookup(LOG_FORMAT_PRETTY_ENV) {
            config.pretty_print = parse_bool(LOG_FORMAT_PRETTY_ENV, &v)?;
        }

        tracing::debug!(
            timestamp_key = config.timestamp_key.as_str(),
            report_caller = config.report_caller,
            pretty_print = config.pretty_print,
            "loaded log format config from environment"
        );
        Ok(config)
    }
}
