//! Template data values.
//!
//! Frontmatter, site settings and page metadata are all converted into
//! [`Value`] before they reach templates, filters and shortcodes.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Naive datetime layouts accepted by [`parse_date`], read as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// A dynamically typed template value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent or explicitly null.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Number, always stored as a float.
    Number(f64),
    /// String.
    String(String),
    /// Timestamp carrying its own UTC offset.
    Date(DateTime<FixedOffset>),
    /// Ordered list.
    List(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build an empty map value.
    #[must_use]
    pub fn map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Whether the value counts as "set" in a template.
    ///
    /// Null, `false`, zero, NaN and the empty string are falsy. Dates, lists
    /// and maps are always truthy, even when empty.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Date(_) | Self::List(_) | Self::Map(_) => true,
        }
    }

    /// Get a field of a map value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Resolve a dotted path such as `page.body` against a map value.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(self, |current, segment| current.get(segment))
    }

    /// Borrow the string contents, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a timestamp.
    ///
    /// Dates are returned as-is, strings go through [`parse_date`] and numbers
    /// are read as milliseconds since the Unix epoch.
    #[must_use]
    pub fn to_date(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Date(date) => Some(*date),
            Self::String(s) => parse_date(s),
            Self::Number(n) if n.is_finite() => {
                DateTime::from_timestamp_millis(*n as i64).map(|d| d.fixed_offset())
            }
            _ => None,
        }
    }

    /// Insert a field into a map value. Does nothing for other variants.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if let Self::Map(map) = self {
            map.insert(key.into(), value.into());
        }
    }
}

/// Parse a date-like string.
///
/// Accepts RFC 3339, RFC 2822, `YYYY-MM-DD` and naive `YYYY-MM-DD[T ]HH:MM[:SS]`
/// forms. Naive forms carry no offset and are read as UTC.
pub fn parse_date(input: &str) -> Option<DateTime<FixedOffset>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(input) {
        return Some(date);
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(input) {
        return Some(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc().fixed_offset());
    }

    NAIVE_DATETIME_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(input, format)
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
            Self::Date(date) => f.write_str(&date.to_rfc3339()),
            Self::List(_) | Self::Map(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(date: DateTime<FixedOffset>) -> Self {
        Self::Date(date)
    }
}

impl From<Vec<Value>> for Value {
    fn from(list: Vec<Value>) -> Self {
        Self::List(list)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value as Yaml;

        match value {
            Yaml::Null => Self::Null,
            Yaml::Bool(b) => Self::Bool(b),
            Yaml::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Yaml::String(s) => Self::String(s),
            Yaml::Sequence(items) => Self::List(items.into_iter().map(Into::into).collect()),
            Yaml::Mapping(mapping) => Self::Map(
                mapping
                    .into_iter()
                    .filter_map(|(key, value)| yaml_key(key).map(|key| (key, value.into())))
                    .collect(),
            ),
            Yaml::Tagged(tagged) => tagged.value.into(),
        }
    }
}

/// Stringify a YAML mapping key. Composite keys are dropped.
fn yaml_key(key: serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        use toml::Value as Toml;

        match value {
            Toml::String(s) => Self::String(s),
            Toml::Integer(n) => Self::Number(n as f64),
            Toml::Float(n) => Self::Number(n),
            Toml::Boolean(b) => Self::Bool(b),
            Toml::Datetime(dt) => {
                let text = dt.to_string();
                parse_date(&text).map_or(Self::String(text), Self::Date)
            }
            Toml::Array(items) => Self::List(items.into_iter().map(Into::into).collect()),
            Toml::Table(table) => Self::Map(
                table
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}
