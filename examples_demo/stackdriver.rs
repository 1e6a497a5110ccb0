use std::io::Write;
use std::time::Duration;

use fluent_json_format::formatter::{CallerFormat, TimestampKey};
use fluent_json_format::http_request::HttpRequest;
use fluent_json_format::{Caller, Formatter, FormatterConfig, Level, LogRecord, SeverityMap};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let formatter = Formatter::new(FormatterConfig {
        timestamp_key: TimestampKey::Time,
        severities: SeverityMap::stackdriver(),
        report_caller: true,
        caller_format: CallerFormat::SourceLocation,
        ..FormatterConfig::default()
    });

    let request = HttpRequest::new("GET", "http://foo.bar/orders/7")
        .status(500)
        .latency(Duration::from_millis(87));

    let record = LogRecord::new(Level::Error, "my log entry")
        .with_field("foo", "bar")
        .with_field("httpRequest", request)
        .with_error(std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream timed out"))
        .with_caller(Caller::new("stackdriver::main", file!(), line!()));

    let line = formatter.format(&record)?;
    std::io::stdout().write_all(&line)?;
    Ok(())
}
