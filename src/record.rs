use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Severity levels understood by the formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
    Panic,
}

impl Level {
    /// Lower-case name used as the lookup key in a [`SeverityMap`](crate::severity::SeverityMap).
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Panic => "panic",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown log level: {0}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            "panic" => Ok(Level::Panic),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Source location of the code that emitted a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl Caller {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Caller {
            function: function.into(),
            file: file.into(),
            line,
        }
    }
}

/// A value that knows how to project itself into JSON.
///
/// Every `Serialize` type gets this for free, so helper types such as
/// [`HttpRequest`](crate::http_request::HttpRequest) pass through the
/// formatter unchanged.
pub trait JsonField: fmt::Debug + Send + Sync {
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T> JsonField for T
where
    T: Serialize + fmt::Debug + Send + Sync,
{
    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Value of a caller-supplied field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Plain JSON value.
    Value(serde_json::Value),
    /// Error object; rendered as its display message.
    Error(Arc<dyn Error + Send + Sync>),
    /// Arbitrary serializable value, projected at format time.
    Custom(Arc<dyn JsonField>),
}

impl FieldValue {
    pub fn error<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        FieldValue::Error(Arc::new(err))
    }

    pub fn custom<T>(value: T) -> Self
    where
        T: JsonField + 'static,
    {
        FieldValue::Custom(Arc::new(value))
    }

    /// Project into JSON. Errors become their message string.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            FieldValue::Value(v) => Ok(v.clone()),
            FieldValue::Error(e) => Ok(serde_json::Value::String(e.to_string())),
            FieldValue::Custom(c) => c.to_json(),
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        FieldValue::Value(v)
    }
}

macro_rules! field_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FieldValue {
                fn from(v: $t) -> Self {
                    FieldValue::Value(serde_json::Value::from(v))
                }
            }
        )*
    };
}

field_value_from!(&str, String, bool, i32, i64, u32, u64, f64);

/// One log event handed to the [`Formatter`](crate::formatter::Formatter).
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub caller: Option<Caller>,
}

impl LogRecord {
    /// New record stamped with the current time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields: BTreeMap::new(),
            caller: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Attach an error under the `error` key.
    pub fn with_error<E>(mut self, err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.fields.insert("error".to_string(), FieldValue::error(err));
        self
    }

    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
