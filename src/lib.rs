pub mod record;
pub mod severity;
pub mod formatter;
pub mod http_request;
pub mod layer;

pub mod env;
pub mod init;

pub use formatter::{FormatError, Formatter, FormatterConfig};
pub use record::{Caller, FieldValue, Level, LogRecord};
pub use severity::{SeverityHandle, SeverityMap, SeverityTable};
