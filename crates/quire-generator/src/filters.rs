//! Built-in template filters.

use quire_core::Value;

use crate::template::TemplateHelpers;

/// Format a date as `YYYY-MM-DD`.
///
/// Falsy input renders as an empty string; input that is not a date is
/// returned unchanged as text. Dates keep their own offset, so
/// `2023-01-05T23:30:00-05:00` is `2023-01-05` and not the next UTC day.
#[must_use]
pub fn date_ymd(value: &Value) -> Value {
    if !value.is_truthy() {
        return Value::from("");
    }

    match value.to_date() {
        Some(date) => Value::from(date.format("%Y-%m-%d").to_string()),
        None => Value::from(value.to_string()),
    }
}

/// Register the built-in filters.
pub fn register(helpers: &mut TemplateHelpers) {
    helpers.add_filter("date_ymd", date_ymd);
}
