//! Build command - generates the static site

use std::{path::Path, time::Instant};

use color_eyre::eyre::{Result, WrapErr};
use quire_generator::{BuildStats, Builder};

use super::load_config;

/// Run the build command.
///
/// Per-file failures do not abort the build; they are printed and returned
/// in the stats so the caller can exit non-zero.
pub fn run(config_path: &Path, output: Option<&Path>, drafts: bool) -> Result<BuildStats> {
    let start = Instant::now();
    tracing::info!(?config_path, ?output, drafts, "Starting build");

    let (mut config, root) = load_config(config_path)?;

    // Include drafts if flag is set
    config.build.drafts |= drafts;

    let mut builder = Builder::new(config, root);
    if let Some(output) = output {
        builder = builder.with_output_dir(output);
    }

    let stats = builder.build().wrap_err("Build failed")?;
    let duration = start.elapsed();

    println!();
    if stats.is_success() {
        println!("  Build completed successfully!");
    } else {
        println!("  Build finished with {} failure(s):", stats.failures.len());
        for failure in &stats.failures {
            println!("  ✗ {}: {}", failure.path.display(), failure.message);
        }
    }
    println!();
    println!("  Pages:       {}", stats.pages);
    println!("  Stylesheets: {}", stats.stylesheets);
    println!("  Partials:    {}", stats.partials);
    println!("  Passthrough: {}", stats.passthrough);
    println!();
    println!("  Duration:    {:.2}s", duration.as_secs_f64());
    println!("  Output:      {}", builder.output_dir().display());
    println!();

    tracing::info!(?stats, ?duration, "Build finished");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_build_into_output_override() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("quire.toml");
        fs::write(&config_path, "[site]\ntitle = \"T\"\n").unwrap();
        fs::write(dir.path().join("index.html"), "<h1>{{ site.title }}</h1>").unwrap();
        fs::write(dir.path().join("draft.html"), "---\ndraft: true\n---\nwip").unwrap();

        let output = dir.path().join("dist");
        let stats = run(&config_path, Some(&output), true).unwrap();

        assert!(stats.is_success());
        assert_eq!(stats.pages, 2);
        assert_eq!(fs::read_to_string(output.join("index.html")).unwrap(), "<h1>T</h1>");
    }

    #[test]
    fn test_output_over_project_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("quire.toml");
        fs::write(&config_path, "").unwrap();
        fs::write(dir.path().join("index.html"), "<p>keep me</p>").unwrap();

        assert!(run(&config_path, Some(dir.path()), false).is_err());
        assert_eq!(
            fs::read_to_string(dir.path().join("index.html")).unwrap(),
            "<p>keep me</p>"
        );
    }

    #[test]
    fn test_failures_are_returned() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("quire.toml");
        fs::write(&config_path, "").unwrap();
        fs::write(dir.path().join("broken.scss"), "a { color: red").unwrap();

        let stats = run(&config_path, None, false).unwrap();

        assert_eq!(stats.failures.len(), 1);
        assert!(dir.path().join("_site").exists());
    }
}
