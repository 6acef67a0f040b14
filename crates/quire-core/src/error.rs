//! Errors raised while loading a project: reading `quire.toml`, layering
//! environment overrides, and splitting page frontmatter.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Failures from `quire-core`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// `quire.toml` is missing, malformed, or fails validation
    /// (empty stylesheet extension, output dir equal to the input dir, ...).
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A page or layout has frontmatter that is not a YAML/TOML mapping.
    #[error("Frontmatter error in {path}: {message}")]
    Frontmatter { path: PathBuf, message: String },

    /// The configuration file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `QUIRE__*` environment overrides could not be merged or deserialized.
    #[error("environment override error: {0}")]
    Env(#[from] config::ConfigError),
}

impl CoreError {
    /// Configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Configuration error wrapping the parser error behind it.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn frontmatter(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Frontmatter {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}
