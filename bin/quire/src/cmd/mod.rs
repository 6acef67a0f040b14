//! Command implementations.

pub mod build;
pub mod watch;

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use quire_core::Config;

/// Load the configuration at `config_path`, with environment overrides.
///
/// Returns it together with the project root, the directory holding the file.
pub fn load_config(config_path: &Path) -> Result<(Config, PathBuf)> {
    let config = Config::load_with_env(config_path).wrap_err("Failed to load configuration")?;

    let root = config_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    tracing::debug!(?config, root = %root.display(), "Loaded configuration");
    Ok((config, root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_config_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quire.toml");
        std::fs::write(&path, "[site]\ntitle = \"T\"\n").unwrap();

        let (config, root) = load_config(&path).unwrap();
        assert_eq!(config.site.title, "T");
        assert_eq!(root, dir.path());
    }

    #[test]
    fn test_bare_file_name_uses_current_dir() {
        let (_, root) = load_config(Path::new("missing-quire.toml")).unwrap();
        assert_eq!(root, PathBuf::from("."));
    }
}
