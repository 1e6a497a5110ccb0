use crate::formatter::Formatter;
use crate::record::{Caller, FieldValue, Level, LogRecord};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` event formatter that renders every event with a
/// [`Formatter`].
///
/// Plug it into a fmt layer with `.event_format(JsonFormat::new(..))`.
/// The fmt layer owns the writer; this type only produces the line.
#[derive(Debug, Clone, Default)]
pub struct JsonFormat {
    formatter: Formatter,
}

impl JsonFormat {
    pub fn new(formatter: Formatter) -> Self {
        Self { formatter }
    }

    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let record = record_from_event(event);
        let line = self.formatter.format(&record).map_err(|_| fmt::Error)?;
        let line = std::str::from_utf8(&line).map_err(|_| fmt::Error)?;
        writer.write_str(line)
    }
}

/// Build a [`LogRecord`] from a `tracing` event.
///
/// The `message` field becomes the record message; the module path stands
/// in for the function name since `tracing` does not record one.
pub fn record_from_event(event: &Event<'_>) -> LogRecord {
    let mut fields = BTreeMap::new();
    let mut message: Option<String> = None;

    let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
    event.record(&mut visitor);

    let meta = event.metadata();
    LogRecord {
        timestamp: Utc::now(),
        level: Level::from(meta.level()),
        message: message.unwrap_or_default(),
        fields,
        caller: Some(Caller::new(
            meta.module_path().unwrap_or_else(|| meta.target()),
            meta.file().unwrap_or_default(),
            meta.line().unwrap_or_default(),
        )),
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, FieldValue>,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: impl Into<FieldValue>) {
        self.fields.insert(field.name().to_string(), value.into());
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, value.to_string());
    }

    // `message` from the macros arrives here as `fmt::Arguments`.
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, format!("{:?}", value));
        }
    }
}
