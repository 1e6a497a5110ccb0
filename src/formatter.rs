use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fmt::Write;
use std::str::FromStr;

use crate::env::ConfigError;
use crate::record::{Caller, LogRecord};
use crate::severity::{SeverityHandle, SeverityMap};

pub const MESSAGE_KEY: &str = "message";
pub const SEVERITY_KEY: &str = "severity";
pub const FUNC_KEY: &str = "func";
pub const FILE_KEY: &str = "file";
pub const SOURCE_LOCATION_KEY: &str = "logging.googleapis.com/sourceLocation";

/// Deprecated per-record severity override field.
pub const SEVERITY_OVERRIDE_KEY: &str = "!severity-override";

/// Prefix given to caller fields that collide with a reserved key.
pub const CLASH_PREFIX: &str = "fields.";

/// Output key holding the record timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampKey {
    /// Legacy `time` key.
    Time,
    #[default]
    Timestamp,
}

impl TimestampKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampKey::Time => "time",
            TimestampKey::Timestamp => "timestamp",
        }
    }
}

impl FromStr for TimestampKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "time" => Ok(TimestampKey::Time),
            "timestamp" => Ok(TimestampKey::Timestamp),
            _ => Err(ConfigError::UnknownTimestampKey(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    /// RFC 3339 in UTC with up to nine fraction digits and trailing zeros
    /// trimmed, e.g. `2024-01-15T10:30:00.5Z`; whole seconds carry no fraction.
    #[default]
    Rfc3339Nano,
    /// chrono strftime pattern.
    Custom(String),
}

impl TimestampFormat {
    /// `false` if a custom pattern contains a specifier chrono does not know.
    pub fn is_valid(&self) -> bool {
        match self {
            TimestampFormat::Rfc3339Nano => true,
            TimestampFormat::Custom(pattern) => {
                !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
            }
        }
    }

    /// Render `ts`. An unusable custom pattern renders as [`TimestampFormat::Rfc3339Nano`].
    pub fn render(&self, ts: &DateTime<Utc>) -> String {
        if let TimestampFormat::Custom(pattern) = self {
            let mut out = String::new();
            if write!(out, "{}", ts.format(pattern)).is_ok() {
                return out;
            }
        }
        trim_fraction(ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }
}

/// Drop trailing zeros from the fraction of a `...SS.fffffffffZ` timestamp,
/// and the dot itself when nothing is left.
fn trim_fraction(mut ts: String) -> String {
    if let Some(dot) = ts.rfind('.') {
        let end = ts.len() - 1;
        let digits = ts[dot + 1..end].trim_end_matches('0').len();
        let keep = if digits == 0 { dot } else { dot + 1 + digits };
        ts.replace_range(keep..end, "");
    }
    ts
}

/// How caller location is written when it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallerFormat {
    /// `func` and `file` (`"<file>:<line>"`) top-level keys.
    #[default]
    Flat,
    /// One `logging.googleapis.com/sourceLocation` object with `file`, `line`, `function`.
    SourceLocation,
}

/// Construction-time options for [`Formatter`].
#[derive(Debug, Clone, PartialEq)]
pub struct FormatterConfig {
    pub timestamp_key: TimestampKey,
    pub timestamp_format: TimestampFormat,
    /// Leave the timestamp out entirely.
    pub disable_timestamp: bool,
    pub severities: SeverityMap,
    pub report_caller: bool,
    pub caller_format: CallerFormat,
    /// Honor the deprecated `!severity-override` field.
    pub severity_override: bool,
    /// Indent the JSON. Output then spans several lines but still ends in one newline.
    pub pretty_print: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            timestamp_key: TimestampKey::default(),
            timestamp_format: TimestampFormat::default(),
            disable_timestamp: false,
            severities: SeverityMap::fluentd(),
            report_caller: false,
            caller_format: CallerFormat::default(),
            severity_override: false,
            pretty_print: false,
        }
    }
}

/// Error returned by [`Formatter::format`].
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("failed to marshal fields to JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Turns a [`LogRecord`] into one newline-terminated JSON document.
///
/// Caller fields that share a name with a key the formatter writes are
/// kept under `fields.<name>` instead of being overwritten.
#[derive(Debug, Clone)]
pub struct Formatter {
    timestamp_key: TimestampKey,
    timestamp_format: TimestampFormat,
    disable_timestamp: bool,
    report_caller: bool,
    caller_format: CallerFormat,
    severity_override: bool,
    pretty_print: bool,
    severities: SeverityHandle,
}

impl Formatter {
    pub fn new(config: FormatterConfig) -> Self {
        if !config.timestamp_format.is_valid() {
            tracing::warn!(
                pattern = ?config.timestamp_format,
                "invalid timestamp pattern, falling back to RFC 3339"
            );
        }
        if config.severity_override {
            tracing::debug!("severity override field {} is deprecated", SEVERITY_OVERRIDE_KEY);
        }

        Formatter {
            timestamp_key: config.timestamp_key,
            timestamp_format: config.timestamp_format,
            disable_timestamp: config.disable_timestamp,
            report_caller: config.report_caller,
            caller_format: config.caller_format,
            severity_override: config.severity_override,
            pretty_print: config.pretty_print,
            severities: SeverityHandle::new(config.severities),
        }
    }

    /// Handle to the active severity table. Clones share the table.
    pub fn severities(&self) -> &SeverityHandle {
        &self.severities
    }

    /// Replace the severity table.
    pub fn use_severities(&self, map: SeverityMap) {
        self.severities.switch(map);
    }

    /// Switch to the cloud logging vocabulary (`DEBUG`, `INFO`, `WARNING`, `ERROR`, `CRITICAL`).
    pub fn use_stackdriver_severities(&self) {
        self.use_severities(SeverityMap::stackdriver());
    }

    /// Format one record.
    ///
    /// Fails only when a field value cannot be projected into JSON; no
    /// partial output is produced in that case.
    ///
    /// `<`, `>`, `&` and U+2028/U+2029 are written unescaped.
    pub fn format(&self, record: &LogRecord) -> Result<Vec<u8>, FormatError> {
        let mut data = Map::new();
        for (key, value) in &record.fields {
            data.insert(key.clone(), value.to_json()?);
        }

        let overridden = if self.severity_override {
            take_severity_override(&mut data)
        } else {
            None
        };

        let caller = record.caller.as_ref().filter(|_| self.report_caller);
        prefix_field_clashes(&mut data, &self.reserved_keys(caller.is_some()));

        if !self.disable_timestamp {
            data.insert(
                self.timestamp_key.as_str().to_string(),
                Value::String(self.timestamp_format.render(&record.timestamp)),
            );
        }
        data.insert(MESSAGE_KEY.to_string(), Value::String(record.message.clone()));

        let severity = match overridden {
            Some(severity) => severity,
            None => self
                .severities
                .snapshot()
                .resolve(record.level.as_str())
                .to_string(),
        };
        data.insert(SEVERITY_KEY.to_string(), Value::String(severity));

        if let Some(caller) = caller {
            self.write_caller(&mut data, caller);
        }

        let mut serialized = if self.pretty_print {
            serde_json::to_vec_pretty(&data)?
        } else {
            serde_json::to_vec(&data)?
        };
        serialized.push(b'\n');
        Ok(serialized)
    }

    /// Keys this formatter writes, in write order.
    fn reserved_keys(&self, with_caller: bool) -> Vec<&'static str> {
        let mut keys = Vec::with_capacity(5);
        if !self.disable_timestamp {
            keys.push(self.timestamp_key.as_str());
        }
        keys.push(MESSAGE_KEY);
        keys.push(SEVERITY_KEY);
        if with_caller {
            match self.caller_format {
                CallerFormat::Flat => {
                    keys.push(FUNC_KEY);
                    keys.push(FILE_KEY);
                }
                CallerFormat::SourceLocation => keys.push(SOURCE_LOCATION_KEY),
            }
        }
        keys
    }

    fn write_caller(&self, data: &mut Map<String, Value>, caller: &Caller) {
        match self.caller_format {
            CallerFormat::Flat => {
                if !caller.function.is_empty() {
                    data.insert(FUNC_KEY.to_string(), Value::String(caller.function.clone()));
                }
                if !caller.file.is_empty() {
                    data.insert(
                        FILE_KEY.to_string(),
                        Value::String(format!("{}:{}", caller.file, caller.line)),
                    );
                }
            }
            CallerFormat::SourceLocation => {
                let mut location = Map::new();
                if !caller.file.is_empty() {
                    location.insert("file".to_string(), Value::String(caller.file.clone()));
                    location.insert("line".to_string(), Value::from(caller.line));
                }
                if !caller.function.is_empty() {
                    location.insert("function".to_string(), Value::String(caller.function.clone()));
                }
                if !location.is_empty() {
                    data.insert(SOURCE_LOCATION_KEY.to_string(), Value::Object(location));
                }
            }
        }
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Formatter::new(FormatterConfig::default())
    }
}

/// Move every caller field named like a reserved key to `fields.<key>`.
///
/// An alias that is already taken gets prefixed again, so nothing the
/// caller supplied is overwritten.
pub fn prefix_field_clashes(data: &mut Map<String, Value>, reserved: &[&str]) {
    for key in reserved {
        if let Some(value) = data.remove(*key) {
            let mut alias = format!("{CLASH_PREFIX}{key}");
            while data.contains_key(&alias) {
                alias.insert_str(0, CLASH_PREFIX);
            }
            data.insert(alias, value);
        }
    }
}

/// Remove the override field. Only string values count; anything else is
/// dropped and the table lookup applies.
fn take_severity_override(data: &mut Map<String, Value>) -> Option<String> {
    match data.remove(SEVERITY_OVERRIDE_KEY)? {
        Value::String(s) => Some(s.to_uppercase()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldValue, Level};
    use serde_json::json;
    use std::collections::HashMap;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_705_314_600, 123_456_789).unwrap()
    }

    fn record(level: Level) -> LogRecord {
        LogRecord::new(level, "my log entry").at(fixed_time())
    }

    fn parse(out: &[u8]) -> Value {
        serde_json::from_slice(out).unwrap()
    }

    #[derive(Debug, thiserror::Error)]
    #[error("test error")]
    struct TestError;

    #[test]
    fn default_output_is_byte_exact() {
        let out = Formatter::default()
            .format(&record(Level::Error).with_field("foo", "bar"))
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"foo\":\"bar\",\"message\":\"my log entry\",\"severity\":\"error\",\
             \"timestamp\":\"2024-01-15T10:30:00.123456789Z\"}\n"
        );
    }

    #[test]
    fn output_ends_in_exactly_one_newline() {
        for pretty_print in [false, true] {
            let formatter = Formatter::new(FormatterConfig {
                pretty_print,
                ..Default::default()
            });
            let out = formatter.format(&record(Level::Info)).unwrap();
            assert!(out.ends_with(b"\n"));
            assert!(!out.ends_with(b"\n\n"));
            parse(&out);
        }
    }

    #[test]
    fn reserved_field_names_are_prefixed() {
        let rec = record(Level::Info)
            .with_field("severity", "weird")
            .with_field("message", "caller message")
            .with_field("timestamp", 7);
        let out = parse(&Formatter::default().format(&rec).unwrap());

        assert_eq!(out["fields.severity"], json!("weird"));
        assert_eq!(out["severity"], json!("info"));
        assert_eq!(out["fields.message"], json!("caller message"));
        assert_eq!(out["message"], json!("my log entry"));
        assert_eq!(out["fields.timestamp"], json!(7));
        assert_eq!(out["timestamp"], json!("2024-01-15T10:30:00.123456789Z"));
    }

    #[test]
    fn legacy_time_key_is_reserved_instead_of_timestamp() {
        let formatter = Formatter::new(FormatterConfig {
            timestamp_key: TimestampKey::Time,
            ..Default::default()
        });
        let rec = record(Level::Info)
            .with_field("time", "caller")
            .with_field("timestamp", "untouched");
        let out = parse(&formatter.format(&rec).unwrap());

        assert_eq!(out["fields.time"], json!("caller"));
        assert_eq!(out["time"], json!("2024-01-15T10:30:00.123456789Z"));
        assert_eq!(out["timestamp"], json!("untouched"));
    }

    #[test]
    fn taken_alias_is_prefixed_again() {
        let rec = record(Level::Info)
            .with_field("severity", "a")
            .with_field("fields.severity", "b");
        let out = parse(&Formatter::default().format(&rec).unwrap());

        assert_eq!(out["fields.severity"], json!("b"));
        assert_eq!(out["fields.fields.severity"], json!("a"));
        assert_eq!(out["severity"], json!("info"));
    }

    #[test]
    fn severity_follows_active_table() {
        let formatter = Formatter::default();
        let rec = record(Level::Error).with_field("foo", "bar");

        let before = parse(&formatter.format(&rec).unwrap());
        formatter.use_stackdriver_severities();
        let after = parse(&formatter.format(&rec).unwrap());

        assert_eq!(before["severity"], json!("error"));
        assert_eq!(after["severity"], json!("ERROR"));

        let mut before = before.as_object().unwrap().clone();
        let mut after = after.as_object().unwrap().clone();
        before.remove("severity");
        after.remove("severity");
        assert_eq!(before, after);
    }

    #[test]
    fn every_level_maps_through_both_tables() {
        let cases = [
            (Level::Panic, "fatal", "CRITICAL"),
            (Level::Fatal, "fatal", "CRITICAL"),
            (Level::Warning, "warn", "WARNING"),
            (Level::Debug, "debug", "DEBUG"),
            (Level::Error, "error", "ERROR"),
            (Level::Trace, "trace", "DEBUG"),
            (Level::Info, "info", "INFO"),
        ];
        let fluentd = Formatter::default();
        let cloud = Formatter::new(FormatterConfig {
            severities: SeverityMap::stackdriver(),
            ..Default::default()
        });
        for (level, expected_fluentd, expected_cloud) in cases {
            let rec = record(level);
            assert_eq!(parse(&fluentd.format(&rec).unwrap())["severity"], json!(expected_fluentd));
            assert_eq!(parse(&cloud.format(&rec).unwrap())["severity"], json!(expected_cloud));
        }
    }

    #[test]
    fn level_missing_from_table_uses_debug_entry() {
        let formatter = Formatter::new(FormatterConfig {
            severities: [("debug", "D"), ("error", "E")].into_iter().collect(),
            ..Default::default()
        });
        let out = parse(&formatter.format(&record(Level::Warning)).unwrap());
        assert_eq!(out["severity"], json!("D"));
    }

    #[test]
    fn error_field_serializes_as_message() {
        let rec = record(Level::Info).with_field("foo", "bar").with_error(TestError);
        let out = parse(&Formatter::default().format(&rec).unwrap());
        assert_eq!(out["error"], json!("test error"));
    }

    #[test]
    fn unserializable_field_is_an_error() {
        let mut bad = HashMap::new();
        bad.insert(vec![1u8, 2], 3);
        let rec = record(Level::Info).with_field("bad", FieldValue::custom(bad));

        let err = Formatter::default().format(&rec).unwrap_err();
        assert!(matches!(err, FormatError::Serialization(_)));
        assert!(err.to_string().starts_with("failed to marshal fields to JSON"));
    }

    #[test]
    fn caller_keys_require_flag_and_caller() {
        let rec = record(Level::Info).with_caller(Caller::new("app::handler", "src/app.rs", 42));

        let off = parse(&Formatter::default().format(&rec).unwrap());
        assert!(off.get("func").is_none());
        assert!(off.get("file").is_none());

        let formatter = Formatter::new(FormatterConfig {
            report_caller: true,
            ..Default::default()
        });
        let on = parse(&formatter.format(&rec).unwrap());
        assert_eq!(on["func"], json!("app::handler"));
        assert_eq!(on["file"], json!("src/app.rs:42"));

        let no_caller = parse(&formatter.format(&record(Level::Info)).unwrap());
        assert!(no_caller.get("func").is_none());
    }

    #[test]
    fn empty_caller_members_are_omitted() {
        let formatter = Formatter::new(FormatterConfig {
            report_caller: true,
            ..Default::default()
        });
        let rec = record(Level::Info).with_caller(Caller::new("", "src/app.rs", 3));
        let out = parse(&formatter.format(&rec).unwrap());
        assert!(out.get("func").is_none());
        assert_eq!(out["file"], json!("src/app.rs:3"));

        let rec = record(Level::Info).with_caller(Caller::new("main", "", 0));
        let out = parse(&formatter.format(&rec).unwrap());
        assert_eq!(out["func"], json!("main"));
        assert!(out.get("file").is_none());
    }

    #[test]
    fn caller_keys_clash_only_when_reported() {
        let rec = record(Level::Info)
            .with_field("func", "mine")
            .with_caller(Caller::new("real", "a.rs", 1));

        let off = parse(&Formatter::default().format(&rec).unwrap());
        assert_eq!(off["func"], json!("mine"));
        assert!(off.get("fields.func").is_none());

        let formatter = Formatter::new(FormatterConfig {
            report_caller: true,
            ..Default::default()
        });
        let on = parse(&formatter.format(&rec).unwrap());
        assert_eq!(on["fields.func"], json!("mine"));
        assert_eq!(on["func"], json!("real"));
    }

    #[test]
    fn source_location_object() {
        let formatter = Formatter::new(FormatterConfig {
            report_caller: true,
            caller_format: CallerFormat::SourceLocation,
            ..Default::default()
        });
        let rec = record(Level::Info).with_caller(Caller::new("app::run", "src/main.rs", 9));
        let out = parse(&formatter.format(&rec).unwrap());
        assert_eq!(
            out[SOURCE_LOCATION_KEY],
            json!({"file": "src/main.rs", "line": 9, "function": "app::run"})
        );
        assert!(out.get("func").is_none());
    }

    #[test]
    fn override_field_is_consumed_and_uppercased() {
        let formatter = Formatter::new(FormatterConfig {
            severity_override: true,
            ..Default::default()
        });
        let rec = record(Level::Info).with_field(SEVERITY_OVERRIDE_KEY, "notice");
        let out = parse(&formatter.format(&rec).unwrap());
        assert_eq!(out["severity"], json!("NOTICE"));
        assert!(out.get(SEVERITY_OVERRIDE_KEY).is_none());

        let rec = record(Level::Info).with_field(SEVERITY_OVERRIDE_KEY, 5);
        let out = parse(&formatter.format(&rec).unwrap());
        assert_eq!(out["severity"], json!("info"));
        assert!(out.get(SEVERITY_OVERRIDE_KEY).is_none());
    }

    #[test]
    fn override_field_is_plain_when_disabled() {
        let rec = record(Level::Info).with_field(SEVERITY_OVERRIDE_KEY, "notice");
        let out = parse(&Formatter::default().format(&rec).unwrap());
        assert_eq!(out["severity"], json!("info"));
        assert_eq!(out[SEVERITY_OVERRIDE_KEY], json!("notice"));
    }

    #[test]
    fn disabled_timestamp_is_not_written_or_reserved() {
        let formatter = Formatter::new(FormatterConfig {
            disable_timestamp: true,
            ..Default::default()
        });
        let rec = record(Level::Info).with_field("timestamp", "caller");
        let out = parse(&formatter.format(&rec).unwrap());
        assert_eq!(out["timestamp"], json!("caller"));
        assert!(out.get("fields.timestamp").is_none());
    }

    #[test]
    fn custom_timestamp_format() {
        let formatter = Formatter::new(FormatterConfig {
            timestamp_format: TimestampFormat::Custom("%Y-%m-%d".to_string()),
            ..Default::default()
        });
        let out = parse(&formatter.format(&record(Level::Info)).unwrap());
        assert_eq!(out["timestamp"], json!("2024-01-15"));
    }

    #[test]
    fn default_timestamp_trims_trailing_zeros() {
        let half = DateTime::from_timestamp(1_705_314_600, 500_000_000).unwrap();
        let whole = DateTime::from_timestamp(1_705_314_600, 0).unwrap();
        let micros = DateTime::from_timestamp(1_705_314_600, 120_000).unwrap();
        let format = TimestampFormat::Rfc3339Nano;

        assert_eq!(format.render(&half), "2024-01-15T10:30:00.5Z");
        assert_eq!(format.render(&whole), "2024-01-15T10:30:00Z");
        assert_eq!(format.render(&micros), "2024-01-15T10:30:00.00012Z");

        let out = parse(&Formatter::default().format(&record(Level::Info).at(half)).unwrap());
        assert_eq!(out["timestamp"], json!("2024-01-15T10:30:00.5Z"));
    }

    #[test]
    fn invalid_timestamp_pattern_falls_back() {
        let format = TimestampFormat::Custom("%Q".to_string());
        assert!(!format.is_valid());
        assert_eq!(format.render(&fixed_time()), "2024-01-15T10:30:00.123456789Z");
    }
}
