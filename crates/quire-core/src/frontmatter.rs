//! Frontmatter parsing for page templates.

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, FixedOffset};

use crate::{
    error::{CoreError, Result},
    value::Value,
};

/// Where a page should be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permalink {
    /// Derive the output path from the input path.
    Default,
    /// Do not write the page at all (`permalink: false`).
    Disabled,
    /// Explicit output path, relative to the output directory.
    Path(String),
}

/// Frontmatter metadata for a page.
///
/// All fields are kept as template data; the typed accessors read the keys
/// the build itself cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    data: BTreeMap<String, Value>,
}

impl Frontmatter {
    /// Wrap already parsed frontmatter data.
    #[must_use]
    pub fn from_data(data: BTreeMap<String, Value>) -> Self {
        Self { data }
    }

    /// All frontmatter fields.
    #[must_use]
    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    /// Get a single field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Page title.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.get("title").and_then(Value::as_str)
    }

    /// Layout name, relative to the includes directory.
    #[must_use]
    pub fn layout(&self) -> Option<&str> {
        self.get("layout")
            .and_then(Value::as_str)
            .filter(|layout| !layout.is_empty())
    }

    /// Whether this page is a draft.
    #[must_use]
    pub fn draft(&self) -> bool {
        matches!(self.get("draft"), Some(Value::Bool(true)))
    }

    /// Explicit `date` field, if it parses.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.get("date").and_then(Value::to_date)
    }

    /// Output path override.
    #[must_use]
    pub fn permalink(&self) -> Permalink {
        match self.get("permalink") {
            Some(Value::Bool(false)) => Permalink::Disabled,
            Some(Value::String(path)) if !path.trim().is_empty() => {
                Permalink::Path(path.trim().to_string())
            }
            _ => Permalink::Default,
        }
    }
}

/// Delimiter types for frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterFormat {
    /// YAML frontmatter delimited by `---`.
    Yaml,
    /// TOML frontmatter delimited by `+++`.
    Toml,
}

impl FrontmatterFormat {
    /// Get the delimiter string for this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

/// Split content into frontmatter and body.
///
/// The closing delimiter must start a line.
pub fn split_frontmatter(content: &str) -> Option<(FrontmatterFormat, &str, &str)> {
    let content = content.trim_start();

    let format = if content.starts_with("---") {
        FrontmatterFormat::Yaml
    } else if content.starts_with("+++") {
        FrontmatterFormat::Toml
    } else {
        return None;
    };

    let delimiter = format.delimiter();
    let after_first = &content[delimiter.len()..];

    let leading = after_first.trim_start_matches([' ', '\t', '\r', '\n']);
    let closing_pos = if leading.starts_with(delimiter) {
        after_first.find(delimiter)?
    } else {
        after_first.find(&format!("\n{delimiter}"))? + 1
    };

    let frontmatter = after_first[..closing_pos].trim();
    let body = after_first[closing_pos + delimiter.len()..].trim_start();

    Some((format, frontmatter, body))
}

/// Parse frontmatter from a page, returning it with the remaining body.
pub fn parse_frontmatter(content: &str, path: &Path) -> Result<(Frontmatter, String)> {
    let Some((format, fm_str, body)) = split_frontmatter(content) else {
        return Ok((Frontmatter::default(), content.to_string()));
    };

    let data = match format {
        FrontmatterFormat::Yaml => {
            let yaml: serde_yaml::Value = serde_yaml::from_str(fm_str)
                .map_err(|e| CoreError::frontmatter(path, e.to_string()))?;
            match Value::from(yaml) {
                Value::Map(map) => map,
                Value::Null => BTreeMap::new(),
                _ => return Err(CoreError::frontmatter(path, "frontmatter must be a mapping")),
            }
        }
        FrontmatterFormat::Toml => {
            let table: toml::Table =
                toml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?;
            table
                .into_iter()
                .map(|(key, value)| (key, value.into()))
                .collect()
        }
    };

    Ok((Frontmatter::from_data(data), body.to_string()))
}
