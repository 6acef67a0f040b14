//! Project configuration management.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Default configuration file name, looked up in the project root.
pub const CONFIG_FILE: &str = "quire.toml";

/// Main configuration structure for Quire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Paths copied verbatim into the output tree, relative to the project root.
    #[serde(default = "default_passthrough")]
    pub passthrough: Vec<String>,

    /// Extra paths whose changes trigger a rebuild in watch mode.
    #[serde(default = "default_watch")]
    pub watch: Vec<String>,

    /// Site-wide settings exposed to templates as `site`.
    #[serde(default)]
    pub site: SiteConfig,

    /// Directory layout.
    #[serde(default)]
    pub dirs: DirsConfig,

    /// Stylesheet pipeline settings.
    #[serde(default)]
    pub styles: StylesConfig,

    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,
}

/// Site-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site title.
    #[serde(default)]
    pub title: String,

    /// Base URL for the site (e.g., "https://example.com").
    #[serde(default)]
    pub base_url: String,
}

/// Directory layout, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirsConfig {
    /// Directory scanned for templates.
    #[serde(default = "default_input_dir")]
    pub input: String,

    /// Layouts directory, also searched for stylesheet imports.
    #[serde(default = "default_includes_dir")]
    pub includes: String,

    /// Output directory for the generated site.
    #[serde(default = "default_output_dir")]
    pub output: String,
}

/// Stylesheet pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// File suffix handled by the stylesheet compiler, without the dot.
    #[serde(default = "default_style_extension")]
    pub extension: String,

    /// Entry point compiled by the inline CSS shortcode.
    #[serde(default = "default_bundle")]
    pub bundle: String,

    /// Import search paths for the bundle.
    #[serde(default = "default_load_paths")]
    pub load_paths: Vec<String>,
}

/// Build configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Whether to render pages marked as drafts.
    #[serde(default)]
    pub drafts: bool,
}

fn default_passthrough() -> Vec<String> {
    vec!["assets/img".to_string()]
}

fn default_watch() -> Vec<String> {
    vec!["bundle.scss".to_string(), "assets/styles/".to_string()]
}

fn default_input_dir() -> String {
    ".".to_string()
}

fn default_includes_dir() -> String {
    "_includes".to_string()
}

fn default_output_dir() -> String {
    "_site".to_string()
}

fn default_style_extension() -> String {
    "scss".to_string()
}

fn default_bundle() -> String {
    "bundle.scss".to_string()
}

fn default_load_paths() -> Vec<String> {
    vec![".".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            passthrough: default_passthrough(),
            watch: default_watch(),
            site: SiteConfig::default(),
            dirs: DirsConfig::default(),
            styles: StylesConfig::default(),
            build: BuildConfig::default(),
        }
    }
}

impl Default for DirsConfig {
    fn default() -> Self {
        Self {
            input: default_input_dir(),
            includes: default_includes_dir(),
            output: default_output_dir(),
        }
    }
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            extension: default_style_extension(),
            bundle: default_bundle(),
            load_paths: default_load_paths(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::read(path, e))?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults when it is absent.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        tracing::info!(path = %path.display(), "no configuration file, using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration using the config crate, with `QUIRE__*` environment overrides.
    ///
    /// A missing file is not an error; defaults and the environment still apply.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("QUIRE").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        let extension = self.styles.extension.trim();
        if extension.is_empty() {
            return Err(CoreError::config("styles.extension cannot be empty"));
        }

        if extension.starts_with('.') {
            return Err(CoreError::config(
                "styles.extension must not start with a dot",
            ));
        }

        if self.styles.bundle.trim().is_empty() {
            return Err(CoreError::config("styles.bundle cannot be empty"));
        }

        if self.dirs.output.trim().is_empty() {
            return Err(CoreError::config("dirs.output cannot be empty"));
        }

        if Path::new(&self.dirs.output) == Path::new(&self.dirs.input) {
            return Err(CoreError::config(
                "dirs.output must differ from dirs.input",
            ));
        }

        if self.site.base_url.ends_with('/') {
            tracing::warn!("site.base_url should not have a trailing slash");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn create_test_config() -> String {
        r#"
passthrough = ["assets/img", "favicon.ico"]
watch = ["bundle.scss"]

[site]
title = "Idea Board"
base_url = "https://example.com"

[dirs]
input = "src"
includes = "layouts"
output = "dist"

[styles]
extension = "sass"
bundle = "styles/main.sass"
load_paths = [".", "node_modules"]

[build]
drafts = true
"#
        .to_string()
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join(CONFIG_FILE);
        let mut file = std::fs::File::create(&config_path).expect("create file");
        file.write_all(create_test_config().as_bytes())
            .expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert_eq!(config.passthrough, vec!["assets/img", "favicon.ico"]);
        assert_eq!(config.watch, vec!["bundle.scss"]);
        assert_eq!(config.site.title, "Idea Board");
        assert_eq!(config.dirs.input, "src");
        assert_eq!(config.dirs.includes, "layouts");
        assert_eq!(config.dirs.output, "dist");
        assert_eq!(config.styles.extension, "sass");
        assert_eq!(config.styles.bundle, "styles/main.sass");
        assert_eq!(config.styles.load_paths, vec![".", "node_modules"]);
        assert!(config.build.drafts);
    }

    #[test]
    fn test_config_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join(CONFIG_FILE);
        std::fs::write(&config_path, "").expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert_eq!(config.passthrough, vec!["assets/img"]);
        assert_eq!(config.watch, vec!["bundle.scss", "assets/styles/"]);
        assert_eq!(config.dirs.input, ".");
        assert_eq!(config.dirs.includes, "_includes");
        assert_eq!(config.dirs.output, "_site");
        assert_eq!(config.styles.extension, "scss");
        assert_eq!(config.styles.bundle, "bundle.scss");
        assert_eq!(config.styles.load_paths, vec!["."]);
        assert!(!config.build.drafts);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config =
            Config::load_or_default(&dir.path().join(CONFIG_FILE)).expect("default config");
        assert_eq!(config.dirs.output, "_site");
    }

    #[test]
    fn test_load_with_env_reads_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join(CONFIG_FILE);
        std::fs::write(&config_path, create_test_config()).expect("write");

        let config = Config::load_with_env(&config_path).expect("load config");
        assert_eq!(config.dirs.output, "dist");
        assert_eq!(config.styles.extension, "sass");
    }

    #[test]
    fn test_load_with_env_without_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = Config::load_with_env(&dir.path().join(CONFIG_FILE)).expect("defaults");
        assert_eq!(config.styles.bundle, "bundle.scss");
        assert_eq!(config.passthrough, vec!["assets/img".to_string()]);
    }

    #[test]
    fn test_config_validation_dotted_extension() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join(CONFIG_FILE);
        std::fs::write(&config_path, "[styles]\nextension = \".scss\"\n").expect("write");

        let result = Config::load(&config_path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must not start with a dot")
        );
    }

    #[test]
    fn test_config_validation_output_equals_input() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join(CONFIG_FILE);
        std::fs::write(&config_path, "[dirs]\ninput = \"site\"\noutput = \"site\"\n")
            .expect("write");

        let result = Config::load(&config_path);
        assert!(result.unwrap_err().to_string().contains("must differ"));
    }

    #[test]
    fn test_config_not_found() {
        let result = Config::load(Path::new("/nonexistent/quire.toml"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }
}
