//! Build orchestration.
//!
//! Coordinates the full and incremental site build.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use quire_core::{Config, Value};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::{
    deps::{DependencyGraph, normalize_path},
    extension::{
        CompileContext, ExtensionError, ExtensionHandler, ExtensionRegistry, StylesheetExtension,
    },
    filters,
    hooks::{BuildEvent, BuildHooks, EventKind},
    inline_css::{InlineBundleCss, InlineCssCache},
    pages::{Page, PageError, PageKind},
    passthrough::{PassthroughCopy, PassthroughError},
    shortcodes,
    stylesheet::StylesheetCompiler,
    template::{TemplateError, TemplateHelpers, TemplateRegistry},
};

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Passthrough copy error.
    #[error("passthrough error: {0}")]
    Passthrough(#[from] PassthroughError),

    /// Layouts could not be loaded.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Page error.
    #[error("page error: {0}")]
    Page(#[from] PageError),

    /// Extension handler error.
    #[error("{0}")]
    Extension(#[from] ExtensionError),

    /// Scanning the input directory failed.
    #[error("failed to scan input: {0}")]
    Walk(#[from] walkdir::Error),

    /// The output directory would swallow the project.
    #[error("refusing to build into {output}: it contains the project sources at {sources}")]
    OutputContainsSources { output: PathBuf, sources: PathBuf },
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// A file that failed to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// Input file.
    pub path: PathBuf,
    /// Rendered error.
    pub message: String,
}

/// Build statistics.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Number of pages written.
    pub pages: usize,

    /// Number of files written by extension handlers.
    pub stylesheets: usize,

    /// Number of extension inputs that produced no output (partials).
    pub partials: usize,

    /// Number of passthrough files copied.
    pub passthrough: usize,

    /// Files that failed; the rest of the build still completed.
    pub failures: Vec<FileFailure>,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

impl BuildStats {
    /// Whether every file built.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Outcome {
    Written,
    Skipped,
    Failed(FileFailure),
}

impl Outcome {
    fn from_result(path: &Path, result: Result<bool>) -> Self {
        match result {
            Ok(true) => Self::Written,
            Ok(false) => Self::Skipped,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to build file");
                Self::Failed(FileFailure {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Inputs found in the input directory.
#[derive(Debug, Default)]
struct Sources {
    extension_inputs: Vec<PathBuf>,
    pages: Vec<PathBuf>,
}

/// Site builder that orchestrates the build process.
#[derive(Debug)]
pub struct Builder {
    config: Config,
    root: PathBuf,
    input_dir: PathBuf,
    includes_dir: PathBuf,
    output_dir: PathBuf,
    hooks: BuildHooks,
    helpers: TemplateHelpers,
    extensions: ExtensionRegistry,
    passthrough: PassthroughCopy,
    bundle: InlineBundleCss,
    inline_css: Arc<InlineCssCache>,
    deps: Arc<DependencyGraph>,
}

impl Builder {
    /// Create a builder for the project at `root`.
    ///
    /// Registers the built-in filters and shortcodes, the stylesheet
    /// extension and the hook that clears the inline CSS cache.
    #[must_use]
    pub fn new(config: Config, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let input_dir = root.join(&config.dirs.input);
        let deps = Arc::new(DependencyGraph::new());
        let inline_css = Arc::new(InlineCssCache::new());

        let mut hooks = BuildHooks::new();
        inline_css.invalidate_before_build(&mut hooks);

        let bundle = InlineBundleCss::new(
            root.join(&config.styles.bundle),
            StylesheetCompiler::new(config.styles.load_paths.iter().map(|p| root.join(p))),
            Arc::clone(&inline_css),
            Arc::clone(&deps),
        );

        let mut helpers = TemplateHelpers::new();
        filters::register(&mut helpers);
        shortcodes::register(&mut helpers);
        let shortcode = bundle.clone();
        helpers.add_shortcode("inline_bundle_css", move |_| shortcode.render());

        let mut extensions = ExtensionRegistry::new();
        extensions.register(StylesheetExtension::new(config.styles.extension.clone()));

        Self {
            includes_dir: input_dir.join(&config.dirs.includes),
            input_dir,
            output_dir: root.join(&config.dirs.output),
            passthrough: PassthroughCopy::new(root.clone(), &config.passthrough),
            config,
            root,
            hooks,
            helpers,
            extensions,
            bundle,
            inline_css,
            deps,
        }
    }

    /// Override the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Subscribe to a lifecycle event.
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&BuildEvent) + Send + Sync + 'static,
    {
        self.hooks.on(kind, handler);
    }

    /// Register a template filter.
    pub fn add_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.helpers.add_filter(name, filter);
    }

    /// Register a shortcode.
    pub fn add_shortcode<F>(&mut self, name: impl Into<String>, shortcode: F)
    where
        F: Fn(&[Value]) -> String + Send + Sync + 'static,
    {
        self.helpers.add_shortcode(name, shortcode);
    }

    /// Register a custom extension handler.
    pub fn add_extension(&mut self, handler: impl ExtensionHandler + 'static) {
        self.extensions.register(handler);
    }

    /// Loaded configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Paths watch mode should observe: the input directory and configured targets.
    #[must_use]
    pub fn watch_targets(&self) -> Vec<PathBuf> {
        let mut targets = vec![self.input_dir.clone()];
        targets.extend(self.config.watch.iter().map(|target| self.root.join(target)));
        targets
    }

    /// Cache used by the `inline_bundle_css` shortcode.
    #[must_use]
    pub fn inline_css(&self) -> &Arc<InlineCssCache> {
        &self.inline_css
    }

    /// Recorded file dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &Arc<DependencyGraph> {
        &self.deps
    }

    /// Execute the full build process.
    pub fn build(&self) -> Result<BuildStats> {
        let start = Instant::now();
        self.hooks.emit(&BuildEvent::BeforeBuild { incremental: false });

        info!(
            input = %self.input_dir.display(),
            output = %self.output_dir.display(),
            "starting build"
        );

        self.check_output_dir()?;
        self.clean_output()?;

        let mut stats = BuildStats {
            passthrough: self.passthrough.copy_all(&self.output_dir)?,
            ..BuildStats::default()
        };

        let templates = self.load_templates()?;
        let sources = self.discover()?;
        self.render(&templates, &sources.extension_inputs, &sources.pages, &mut stats);

        Ok(self.finish(stats, start))
    }

    /// Rebuild after `changed` files were modified.
    ///
    /// The output directory is kept. Only extension inputs that changed or
    /// depend on a changed file are recompiled; every page is re-rendered
    /// since its inline CSS may have changed.
    pub fn build_incremental(&self, changed: &[PathBuf]) -> Result<BuildStats> {
        let start = Instant::now();
        self.hooks.emit(&BuildEvent::BeforeWatch {
            changed: changed.to_vec(),
        });
        self.hooks.emit(&BuildEvent::BeforeBuild { incremental: true });

        info!(changed = changed.len(), "starting incremental build");

        self.check_output_dir()?;
        fs::create_dir_all(&self.output_dir)?;

        let mut stats = BuildStats {
            passthrough: self.passthrough.copy_matching(&self.output_dir, changed)?,
            ..BuildStats::default()
        };

        let templates = self.load_templates()?;
        let sources = self.discover()?;

        let affected = self.deps.affected(changed);
        let inputs: Vec<PathBuf> = sources
            .extension_inputs
            .into_iter()
            .filter(|input| affected.contains(&normalize_path(input)))
            .collect();
        debug!(recompile = inputs.len(), "extension inputs affected by change");

        self.render(&templates, &inputs, &sources.pages, &mut stats);

        Ok(self.finish(stats, start))
    }

    /// Whether a change touches the inline bundle or anything it imports.
    #[must_use]
    pub fn affects_inline_css(&self, changed: &[PathBuf]) -> bool {
        let bundle = normalize_path(self.bundle.bundle());
        let imports: BTreeSet<PathBuf> = self.deps.dependencies_of(&bundle).into_iter().collect();

        changed
            .iter()
            .map(|path| normalize_path(path))
            .any(|path| path == bundle || imports.contains(&path))
    }

    /// Whether every change is an extension input that leaves the inline CSS alone.
    ///
    /// Watch mode can then reload stylesheets without reloading pages.
    #[must_use]
    pub fn is_stylesheet_only(&self, changed: &[PathBuf]) -> bool {
        !changed.is_empty()
            && changed.iter().all(|path| self.extensions.handles(path))
            && !self.affects_inline_css(changed)
    }

    fn finish(&self, mut stats: BuildStats, start: Instant) -> BuildStats {
        stats.duration_ms = start.elapsed().as_millis() as u64;

        if stats.is_success() {
            info!(
                pages = stats.pages,
                stylesheets = stats.stylesheets,
                partials = stats.partials,
                passthrough = stats.passthrough,
                duration_ms = stats.duration_ms,
                "build complete"
            );
        } else {
            warn!(
                pages = stats.pages,
                stylesheets = stats.stylesheets,
                failures = stats.failures.len(),
                duration_ms = stats.duration_ms,
                "build finished with failures"
            );
        }

        self.hooks.emit(&BuildEvent::AfterBuild {
            stats: stats.clone(),
        });
        stats
    }

    /// The output directory must not be, or contain, the root or the input directory.
    fn check_output_dir(&self) -> Result<()> {
        let output = normalize_path(&self.output_dir);
        for sources in [&self.root, &self.input_dir] {
            let sources = normalize_path(sources);
            if sources.starts_with(&output) {
                return Err(BuildError::OutputContainsSources { output, sources });
            }
        }
        Ok(())
    }

    /// Clean the output directory.
    fn clean_output(&self) -> Result<()> {
        if self.output_dir.exists() {
            debug!(dir = %self.output_dir.display(), "cleaning output directory");
            fs::remove_dir_all(&self.output_dir)?;
        }
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    fn load_templates(&self) -> Result<TemplateRegistry> {
        let mut templates = TemplateRegistry::with_helpers(self.helpers.clone());
        templates.load_dir(&self.includes_dir)?;
        Ok(templates)
    }

    /// Walk the input directory for pages and extension inputs.
    fn discover(&self) -> Result<Sources> {
        let input_dir = normalize_path(&self.input_dir);
        let mut excluded = vec![
            normalize_path(&self.output_dir),
            normalize_path(&self.includes_dir),
        ];
        excluded.extend(self.passthrough.sources().iter().map(|p| normalize_path(p)));

        let walker = WalkDir::new(&input_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_ignored(entry, &excluded));

        let mut sources = Sources::default();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.into_path();
            if self.extensions.handles(&path) {
                sources.extension_inputs.push(path);
            } else if PageKind::from_path(&path).is_some() {
                sources.pages.push(path);
            }
        }

        debug!(
            pages = sources.pages.len(),
            extension_inputs = sources.extension_inputs.len(),
            "discovered inputs"
        );
        Ok(sources)
    }

    /// Compile extension inputs and render pages in parallel.
    fn render(
        &self,
        templates: &TemplateRegistry,
        extension_inputs: &[PathBuf],
        pages: &[PathBuf],
        stats: &mut BuildStats,
    ) {
        let input_dir = normalize_path(&self.input_dir);
        let context = CompileContext::new(&self.includes_dir, &self.deps);

        let (extension_outcomes, page_outcomes): (Vec<_>, Vec<_>) = rayon::join(
            || {
                extension_inputs
                    .par_iter()
                    .map(|path| {
                        let result = self.compile_extension(path, &input_dir, &context);
                        Outcome::from_result(path, result)
                    })
                    .collect()
            },
            || {
                pages
                    .par_iter()
                    .map(|path| {
                        let result = self.render_page(path, &input_dir, templates);
                        Outcome::from_result(path, result)
                    })
                    .collect()
            },
        );

        for outcome in extension_outcomes {
            match outcome {
                Outcome::Written => stats.stylesheets += 1,
                Outcome::Skipped => stats.partials += 1,
                Outcome::Failed(failure) => stats.failures.push(failure),
            }
        }

        for outcome in page_outcomes {
            match outcome {
                Outcome::Written => stats.pages += 1,
                Outcome::Skipped => {}
                Outcome::Failed(failure) => stats.failures.push(failure),
            }
        }
    }

    /// Compile one extension input. Returns whether output was written.
    fn compile_extension(
        &self,
        path: &Path,
        input_dir: &Path,
        context: &CompileContext<'_>,
    ) -> Result<bool> {
        let Some(handler) = self.extensions.for_path(path) else {
            return Ok(false);
        };

        let content = fs::read_to_string(path)?;

        let Some(render) = handler.compile(&content, path, context)? else {
            return Ok(false);
        };

        let relative = path.strip_prefix(input_dir).unwrap_or(path);
        let mut data = Value::map();
        data.insert("input_path", relative.to_string_lossy().replace('\\', "/"));

        let output = relative.with_extension(handler.output_extension());
        self.write_output(&output, &render(&data))?;
        Ok(true)
    }

    /// Render one page. Returns whether output was written.
    fn render_page(&self, path: &Path, input_dir: &Path, templates: &TemplateRegistry) -> Result<bool> {
        let page = Page::load(path, input_dir)?;

        if page.is_draft() && !self.config.build.drafts {
            debug!(path = %path.display(), "skipping draft");
            return Ok(false);
        }

        let Some(output) = page.output_path.as_deref() else {
            debug!(path = %path.display(), "permalink disabled, skipping");
            return Ok(false);
        };

        let html = page.render(templates, &self.config.site)?;
        self.write_output(output, &html)?;
        Ok(true)
    }

    fn write_output(&self, relative: &Path, content: &str) -> Result<()> {
        let output_path = self.output_dir.join(relative);
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&output_path, content)?;

        debug!(path = %output_path.display(), "wrote output");
        Ok(())
    }
}

/// Hidden entries, `node_modules` and excluded directories are never inputs.
fn is_ignored(entry: &DirEntry, excluded: &[PathBuf]) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || name == "node_modules"
        || excluded.iter().any(|dir| entry.path() == dir.as_path())
}
