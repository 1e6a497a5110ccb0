use fluent_json_format::env::{env_or, LOG_FORMAT_SEVERITY_TABLE_ENV};
use fluent_json_format::init::{init_json_logging_with_config, LoggingConfig};
use fluent_json_format::{FormatterConfig, SeverityTable};
use tracing::{error, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let table: SeverityTable = env_or(LOG_FORMAT_SEVERITY_TABLE_ENV, "fluentd").parse()?;

    let config = LoggingConfig {
        format: FormatterConfig {
            severities: table.to_map(),
            report_caller: true,
            ..FormatterConfig::default()
        },
        ..LoggingConfig::default()
    };
    let severities = init_json_logging_with_config(config)?;

    info!("starting service");
    warn!(user_id = 42, severity = "caller-supplied", "severity field is kept as fields.severity");

    // Administrative switch to the cloud logging vocabulary.
    severities.switch(SeverityTable::Stackdriver.to_map());
    error!(order_id = 123, "order failed");

    Ok(())
}
