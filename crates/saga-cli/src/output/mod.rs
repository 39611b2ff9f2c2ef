mod formatter;
mod json;
mod plain;

pub(crate) use formatter::ResultFormatter;
pub(crate) use json::JsonFormatter;
pub(crate) use plain::PlainTextFormatter;
