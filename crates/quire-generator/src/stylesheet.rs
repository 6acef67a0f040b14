//! Stylesheet compilation.
//!
//! Wraps the `grass` Sass compiler. Every compile records the files it read
//! so callers can register them as build dependencies.
//!
//! Two failure modes are exposed:
//!
//! - [`StylesheetCompiler::compile_strict`] returns the error to the caller.
//! - [`StylesheetCompiler::compile_resilient`] logs the error and yields
//!   [`Resilient::Placeholder`] instead.

use std::{
    collections::BTreeSet,
    io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use thiserror::Error;
use tracing::{debug, error};

use crate::deps::normalize_path;

/// Inserted in place of inline CSS when the bundle fails to compile.
pub const PLACEHOLDER: &str = "<!-- CSS failed to compile -->";

/// Stylesheet compilation errors.
#[derive(Debug, Error)]
pub enum StylesheetError {
    /// The compiler rejected the source.
    #[error("failed to compile {path}: {message}")]
    Compile {
        path: PathBuf,
        message: String,
        /// Files read before the error was hit.
        loaded_files: Vec<PathBuf>,
    },
}

impl StylesheetError {
    /// Files the failed compile read, sorted and canonicalized.
    ///
    /// A broken import is among them, so it can still be tracked as a
    /// dependency until the next successful compile.
    #[must_use]
    pub fn loaded_files(&self) -> &[PathBuf] {
        match self {
            Self::Compile { loaded_files, .. } => loaded_files,
        }
    }
}

/// Result type for stylesheet operations.
pub type Result<T> = std::result::Result<T, StylesheetError>;

/// Compiled CSS together with the files read to produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compilation {
    css: String,
    loaded_files: Vec<PathBuf>,
}

impl Compilation {
    /// The generated CSS.
    #[must_use]
    pub fn css(&self) -> &str {
        &self.css
    }

    /// Files read during compilation, sorted and canonicalized.
    #[must_use]
    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded_files
    }

    /// Take the generated CSS.
    #[must_use]
    pub fn into_css(self) -> String {
        self.css
    }
}

/// Outcome of a compile that must not fail the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resilient {
    /// Compilation succeeded.
    Compiled(Compilation),
    /// Compilation failed and was logged.
    Placeholder,
}

/// What to compile.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    /// A stylesheet on disk. Imports also resolve relative to its directory.
    File(&'a Path),
    /// Source text read from `origin`. Imports resolve against the directory of
    /// `origin` (or `.` when it has none) before the configured load paths.
    Source { content: &'a str, origin: &'a Path },
}

impl Input<'_> {
    fn path(&self) -> &Path {
        match self {
            Self::File(path) => path,
            Self::Source { origin, .. } => origin,
        }
    }
}

/// `grass` filesystem that remembers every file it reads.
#[derive(Debug, Default)]
struct RecordingFs {
    loaded: Mutex<BTreeSet<PathBuf>>,
}

impl RecordingFs {
    fn into_loaded(self) -> Vec<PathBuf> {
        self.loaded
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .collect()
    }
}

impl grass::Fs for RecordingFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let bytes = std::fs::read(path)?;
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_path(path));
        Ok(bytes)
    }
}

/// Compiles Sass/SCSS sources to compressed CSS.
#[derive(Debug, Clone, Default)]
pub struct StylesheetCompiler {
    load_paths: Vec<PathBuf>,
}

impl StylesheetCompiler {
    /// Create a compiler with the given import search paths.
    #[must_use]
    pub fn new<I, P>(load_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            load_paths: load_paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Configured import search paths.
    #[must_use]
    pub fn load_paths(&self) -> &[PathBuf] {
        &self.load_paths
    }

    /// Compile, returning any compiler error to the caller.
    pub fn compile_strict(&self, input: Input<'_>) -> Result<Compilation> {
        let fs = RecordingFs::default();

        let mut load_paths = Vec::with_capacity(self.load_paths.len() + 1);
        if let Input::Source { origin, .. } = input {
            let dir = origin
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            load_paths.push(dir.to_path_buf());
        }
        load_paths.extend(self.load_paths.iter().cloned());

        let compiled = {
            let options = grass::Options::default()
                .style(grass::OutputStyle::Compressed)
                .input_syntax(input_syntax(input.path()))
                .load_paths(load_paths.as_slice())
                .fs(&fs);

            match input {
                Input::File(path) => grass::from_path(path, &options),
                Input::Source { content, .. } => grass::from_string(content.to_owned(), &options),
            }
        };

        let loaded_files = fs.into_loaded();
        let css = compiled.map_err(|e| StylesheetError::Compile {
            path: input.path().to_path_buf(),
            message: e.to_string(),
            loaded_files: loaded_files.clone(),
        })?;

        debug!(
            path = %input.path().display(),
            loaded = loaded_files.len(),
            bytes = css.len(),
            "compiled stylesheet"
        );

        Ok(Compilation {
            css: css.trim_end().to_string(),
            loaded_files,
        })
    }

    /// Compile, logging any error and returning [`Resilient::Placeholder`] instead.
    pub fn compile_resilient(&self, input: Input<'_>) -> Resilient {
        match self.compile_strict(input) {
            Ok(compilation) => Resilient::Compiled(compilation),
            Err(e) => {
                error!(error = %e, "stylesheet compile failed, substituting placeholder");
                Resilient::Placeholder
            }
        }
    }
}

/// Pick the syntax from the file extension; anything unknown is SCSS.
fn input_syntax(path: &Path) -> grass::InputSyntax {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("sass") => grass::InputSyntax::Sass,
        Some("css") => grass::InputSyntax::Css,
        _ => grass::InputSyntax::Scss,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_compile_source_compressed() {
        let compiler = StylesheetCompiler::default();
        let compilation = compiler
            .compile_strict(Input::Source {
                content: "$c: red;\na {\n  color: $c;\n}\n",
                origin: Path::new("inline.scss"),
            })
            .unwrap();

        assert_eq!(compilation.css(), "a{color:red}");
        assert!(compilation.loaded_files().is_empty());
    }

    #[test]
    fn test_source_imports_resolve_against_origin_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("_colors.scss"), "$brand: red;").unwrap();
        let origin = dir.path().join("site.scss");

        let compiler = StylesheetCompiler::default();
        let compilation = compiler
            .compile_strict(Input::Source {
                content: "@import \"colors\";\n.logo { color: $brand; }",
                origin: &origin,
            })
            .unwrap();

        assert!(compilation.css().contains(".logo{color:red}"));
        assert_eq!(compilation.loaded_files().len(), 1);
        assert!(compilation.loaded_files()[0].ends_with("_colors.scss"));
    }

    #[test]
    fn test_load_paths_are_searched() {
        let dir = TempDir::new().unwrap();
        let includes = dir.path().join("_includes");
        fs::create_dir(&includes).unwrap();
        fs::write(includes.join("_mixins.scss"), "@mixin pad { padding: 1px; }").unwrap();

        let compiler = StylesheetCompiler::new([&includes]);
        let compilation = compiler
            .compile_strict(Input::Source {
                content: "@import \"mixins\";\n.card { @include pad; }",
                origin: &dir.path().join("styles").join("card.scss"),
            })
            .unwrap();

        assert!(compilation.css().contains(".card{padding:1px}"));
        assert!(compilation.loaded_files()[0].ends_with("_mixins.scss"));
    }

    #[test]
    fn test_compile_file_records_entry_and_imports() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("assets/styles")).unwrap();
        fs::write(dir.path().join("assets/styles/_base.scss"), "body { margin: 0; }").unwrap();
        let bundle = dir.path().join("bundle.scss");
        fs::write(&bundle, "@import \"assets/styles/base\";").unwrap();

        let compiler = StylesheetCompiler::new([dir.path()]);
        let compilation = compiler.compile_strict(Input::File(&bundle)).unwrap();

        assert!(compilation.css().contains("body{margin:0}"));
        let loaded = compilation.loaded_files();
        assert!(loaded.iter().any(|p| p.ends_with("_base.scss")));
    }

    #[test]
    fn test_strict_compile_reports_error() {
        let compiler = StylesheetCompiler::default();
        let err = compiler
            .compile_strict(Input::Source {
                content: "a { color: red",
                origin: Path::new("broken.scss"),
            })
            .unwrap_err();

        assert!(err.to_string().contains("broken.scss"));
    }

    #[test]
    fn test_failed_compile_keeps_loaded_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("_partial.scss"), "$c: red; .x {").unwrap();

        let compiler = StylesheetCompiler::default();
        let err = compiler
            .compile_strict(Input::Source {
                content: "@import \"partial\";\na { color: $c; }",
                origin: &dir.path().join("site.scss"),
            })
            .unwrap_err();

        assert_eq!(err.loaded_files().len(), 1);
        assert!(err.loaded_files()[0].ends_with("_partial.scss"));
    }

    #[test]
    fn test_resilient_compile_yields_placeholder() {
        let compiler = StylesheetCompiler::default();
        let outcome = compiler.compile_resilient(Input::File(Path::new("/nonexistent/bundle.scss")));
        assert_eq!(outcome, Resilient::Placeholder);
    }

    #[test]
    fn test_indented_syntax_by_extension() {
        let compiler = StylesheetCompiler::default();
        let compilation = compiler
            .compile_strict(Input::Source {
                content: "a\n  color: blue\n",
                origin: Path::new("plain.sass"),
            })
            .unwrap();

        assert_eq!(compilation.css(), "a{color:blue}");
    }
}
