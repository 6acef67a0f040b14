//! Custom template formats keyed by file extension.
//!
//! An [`ExtensionHandler`] turns the content of a matching input file into a
//! [`RenderFn`]; the builder later calls it with page data and writes the
//! result next to the other outputs. Returning `None` from
//! [`ExtensionHandler::compile`] means "produce no output for this file".

use std::{collections::HashMap, fmt, path::Path, sync::Arc};

use quire_core::Value;
use thiserror::Error;
use tracing::debug;

use crate::{
    deps::DependencyGraph,
    stylesheet::{Input, StylesheetCompiler, StylesheetError},
};

/// Extension handler errors.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// Stylesheet compilation failed.
    #[error(transparent)]
    Stylesheet(#[from] StylesheetError),
}

/// Result type for extension handlers.
pub type Result<T> = std::result::Result<T, ExtensionError>;

/// Renders a compiled template with page data.
pub type RenderFn = Box<dyn Fn(&Value) -> String + Send + Sync>;

/// Build state handed to [`ExtensionHandler::compile`].
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    includes_dir: &'a Path,
    deps: &'a DependencyGraph,
}

impl<'a> CompileContext<'a> {
    /// Create a context.
    #[must_use]
    pub fn new(includes_dir: &'a Path, deps: &'a DependencyGraph) -> Self {
        Self { includes_dir, deps }
    }

    /// The configured includes directory.
    #[must_use]
    pub fn includes_dir(&self) -> &'a Path {
        self.includes_dir
    }

    /// Register files `input` depends on, so editing them rebuilds `input`.
    pub fn add_dependencies(&self, input: &Path, dependencies: &[impl AsRef<Path>]) {
        self.deps.add_dependencies(input, dependencies);
    }

    /// Replace the files `input` depends on.
    pub fn set_dependencies(&self, input: &Path, dependencies: &[impl AsRef<Path>]) {
        self.deps.set_dependencies(input, dependencies);
    }
}

/// A template format handled by file extension.
pub trait ExtensionHandler: fmt::Debug + Send + Sync {
    /// Input extension, without the dot.
    fn extension(&self) -> &str;

    /// Extension of the written output, without the dot.
    fn output_extension(&self) -> &str;

    /// Compile `content` read from `path`.
    fn compile(
        &self,
        content: &str,
        path: &Path,
        context: &CompileContext<'_>,
    ) -> Result<Option<RenderFn>>;
}

/// Sass/SCSS stylesheets compiled to CSS.
#[derive(Debug, Clone)]
pub struct StylesheetExtension {
    extension: String,
}

impl StylesheetExtension {
    /// Handle files ending in `.{extension}`.
    #[must_use]
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

/// Partials are only imported by other stylesheets.
fn is_partial(path: &Path) -> bool {
    path.file_stem()
        .is_some_and(|stem| stem.to_string_lossy().starts_with('_'))
}

impl ExtensionHandler for StylesheetExtension {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn output_extension(&self) -> &str {
        "css"
    }

    fn compile(
        &self,
        content: &str,
        path: &Path,
        context: &CompileContext<'_>,
    ) -> Result<Option<RenderFn>> {
        if is_partial(path) {
            debug!(path = %path.display(), "skipping partial");
            return Ok(None);
        }

        let compiler = StylesheetCompiler::new([context.includes_dir()]);
        let compilation = match compiler.compile_strict(Input::Source {
            content,
            origin: path,
        }) {
            Ok(compilation) => compilation,
            Err(e) => {
                // Keep earlier edges; fixing a broken import must still rebuild this file.
                context.add_dependencies(path, e.loaded_files());
                return Err(e.into());
            }
        };

        context.set_dependencies(path, compilation.loaded_files());

        let css = compilation.into_css();
        Ok(Some(Box::new(move |_data| css.clone())))
    }
}

/// Registered extension handlers.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    handlers: HashMap<String, Arc<dyn ExtensionHandler>>,
}

impl ExtensionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same extension.
    pub fn register(&mut self, handler: impl ExtensionHandler + 'static) {
        self.handlers
            .insert(handler.extension().to_string(), Arc::new(handler));
    }

    /// Handler for a file extension.
    #[must_use]
    pub fn get(&self, extension: &str) -> Option<&Arc<dyn ExtensionHandler>> {
        self.handlers.get(extension)
    }

    /// Handler for a file, by its extension.
    #[must_use]
    pub fn for_path(&self, path: &Path) -> Option<&Arc<dyn ExtensionHandler>> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get(ext))
    }

    /// Whether a handler exists for this file.
    #[must_use]
    pub fn handles(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_partial_produces_nothing() {
        let deps = DependencyGraph::new();
        let context = CompileContext::new(Path::new("_includes"), &deps);
        let handler = StylesheetExtension::new("scss");

        let result = handler
            .compile("$c: red;", Path::new("styles/_colors.scss"), &context)
            .unwrap();

        assert!(result.is_none());
        assert!(deps.is_empty());
    }

    #[test]
    fn test_render_returns_css_verbatim() {
        let deps = DependencyGraph::new();
        let context = CompileContext::new(Path::new("_includes"), &deps);
        let handler = StylesheetExtension::new("scss");

        let render = handler
            .compile("a { b { color: red; } }", Path::new("site.scss"), &context)
            .unwrap()
            .expect("render function");

        let mut data = Value::map();
        data.insert("title", "ignored");
        assert_eq!(render(&data), "a b{color:red}");
        assert_eq!(render(&Value::Null), "a b{color:red}");
    }

    #[test]
    fn test_imports_become_dependencies() {
        let dir = TempDir::new().unwrap();
        let includes = dir.path().join("_includes");
        let styles = dir.path().join("styles");
        fs::create_dir_all(&includes).unwrap();
        fs::create_dir_all(&styles).unwrap();
        fs::write(includes.join("_mixins.scss"), "@mixin pad { padding: 1px; }").unwrap();
        fs::write(styles.join("_colors.scss"), "$c: red;").unwrap();
        let input = styles.join("site.scss");
        let content = "@import \"colors\";\n@import \"mixins\";\n.a { color: $c; @include pad; }";
        fs::write(&input, content).unwrap();

        let deps = DependencyGraph::new();
        let context = CompileContext::new(&includes, &deps);
        let handler = StylesheetExtension::new("scss");
        handler.compile(content, &input, &context).unwrap().unwrap();

        let recorded = deps.dependencies_of(&input);
        assert_eq!(recorded.len(), 2);
        assert_eq!(deps.dependents_of(&includes.join("_mixins.scss")).len(), 1);
        assert_eq!(deps.dependents_of(&styles.join("_colors.scss")).len(), 1);
    }

    #[test]
    fn test_syntax_error_propagates() {
        let deps = DependencyGraph::new();
        let context = CompileContext::new(Path::new("_includes"), &deps);
        let handler = StylesheetExtension::new("scss");

        let result = handler.compile("a { color: red", Path::new("broken.scss"), &context);
        let err = result.err().expect("compile error");
        assert!(matches!(err, ExtensionError::Stylesheet(_)));
        assert!(err.to_string().contains("broken.scss"));
    }

    #[test]
    fn test_failed_compile_keeps_dependencies() {
        let dir = TempDir::new().unwrap();
        let partial = dir.path().join("_colors.scss");
        let input = dir.path().join("site.scss");
        let content = "@import \"colors\";\na { color: $c; }";
        fs::write(&partial, "$c: red;").unwrap();
        fs::write(&input, content).unwrap();

        let deps = DependencyGraph::new();
        let context = CompileContext::new(dir.path(), &deps);
        let handler = StylesheetExtension::new("scss");
        handler.compile(content, &input, &context).unwrap();

        fs::write(&partial, "$c: red; .x {").unwrap();
        assert!(handler.compile(content, &input, &context).is_err());
        assert_eq!(deps.dependents_of(&partial).len(), 1);

        fs::write(&partial, "$c: blue;").unwrap();
        handler.compile(content, &input, &context).unwrap();
        assert_eq!(deps.dependents_of(&partial).len(), 1);
    }

    #[test]
    fn test_registry_lookup_by_extension() {
        let mut registry = ExtensionRegistry::new();
        registry.register(StylesheetExtension::new("scss"));

        assert!(registry.handles(Path::new("a/b/site.scss")));
        assert!(!registry.handles(Path::new("a/b/site.css")));
        assert!(!registry.handles(Path::new("Makefile")));
        assert_eq!(
            registry.get("scss").map(|h| h.output_extension()),
            Some("css")
        );
    }
}
