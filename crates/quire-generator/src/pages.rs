//! HTML and Markdown pages.
//!
//! A page is rendered in three steps: its body goes through the template
//! engine, Markdown bodies are then converted to HTML, and the result is
//! wrapped in the layouts named by its frontmatter.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use chrono::{DateTime, FixedOffset, Utc};
use pulldown_cmark::{Options, Parser, html};
use quire_core::{
    CoreError, Frontmatter, Permalink, Value, config::SiteConfig, frontmatter::parse_frontmatter,
};
use thiserror::Error;

use crate::template::{TemplateContext, TemplateError, TemplateRegistry};

/// Page errors.
#[derive(Debug, Error)]
pub enum PageError {
    /// Reading the page failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Frontmatter could not be parsed.
    #[error(transparent)]
    Frontmatter(#[from] CoreError),

    /// Template rendering failed.
    #[error("template error in {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: TemplateError,
    },

    /// The permalink points outside the output directory.
    #[error("invalid permalink {permalink:?} in {path}: must stay inside the output directory")]
    InvalidPermalink { path: PathBuf, permalink: String },
}

/// Result type for page operations.
pub type Result<T> = std::result::Result<T, PageError>;

/// Source format of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// `.html`, rendered as-is after templating.
    Html,
    /// `.md`, converted to HTML after templating.
    Markdown,
}

impl PageKind {
    /// Kind for a path, by extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "html" | "htm" => Some(Self::Html),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// A page loaded from the input directory.
#[derive(Debug, Clone)]
pub struct Page {
    /// Path of the source file.
    pub input_path: PathBuf,
    /// Source path relative to the input directory.
    pub relative_path: PathBuf,
    /// Source format.
    pub kind: PageKind,
    /// Parsed frontmatter.
    pub frontmatter: Frontmatter,
    /// Body without frontmatter, before any rendering.
    pub body: String,
    /// Frontmatter `date`, or the file's modification time.
    pub date: DateTime<FixedOffset>,
    /// Output path relative to the output directory, `None` when disabled.
    pub output_path: Option<PathBuf>,
    /// Public URL, `None` when the page has no output.
    pub url: Option<String>,
}

impl Page {
    /// Read and parse a page.
    pub fn load(path: &Path, input_dir: &Path) -> Result<Self> {
        let io_error = |source| PageError::Io {
            path: path.to_path_buf(),
            source,
        };

        let source = fs::read_to_string(path).map_err(io_error)?;
        let modified = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map(|time| DateTime::<Utc>::from(time).fixed_offset())
            .ok();

        let relative = path.strip_prefix(input_dir).unwrap_or(path);
        Self::from_source(path, relative, &source, modified)
    }

    /// Parse a page from its source text.
    pub fn from_source(
        input_path: &Path,
        relative_path: &Path,
        source: &str,
        modified: Option<DateTime<FixedOffset>>,
    ) -> Result<Self> {
        let (frontmatter, body) = parse_frontmatter(source, input_path)?;

        let kind = PageKind::from_path(input_path).unwrap_or(PageKind::Html);
        let date = frontmatter
            .date()
            .or(modified)
            .unwrap_or_else(|| Utc::now().fixed_offset());
        let output_path = output_path_for(relative_path, &frontmatter.permalink())?;
        let url = output_path.as_deref().map(url_for);

        Ok(Self {
            input_path: input_path.to_path_buf(),
            relative_path: relative_path.to_path_buf(),
            kind,
            frontmatter,
            body,
            date,
            output_path,
            url,
        })
    }

    /// Whether the page is marked as a draft.
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.frontmatter.draft()
    }

    /// Stem used in URLs: the file stem, or the directory name for `index` files.
    #[must_use]
    pub fn file_slug(&self) -> String {
        let stem = self
            .relative_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if stem != "index" {
            return stem;
        }

        self.relative_path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Template context: frontmatter fields, `page` and `site`.
    #[must_use]
    pub fn context(&self, site: &SiteConfig) -> TemplateContext {
        let mut context = TemplateContext::new();
        context.extend(self.frontmatter.data());

        let mut page = Value::map();
        page.insert("url", self.url.clone());
        page.insert(
            "input_path",
            self.relative_path.to_string_lossy().replace('\\', "/"),
        );
        page.insert("file_slug", self.file_slug());
        page.insert("date", self.date);
        page.insert("body", self.body.as_str());
        context.insert("page", page);

        let mut site_value = Value::map();
        site_value.insert("title", site.title.as_str());
        site_value.insert("base_url", site.base_url.as_str());
        context.insert("site", site_value);

        context
    }

    /// Render the page to its final HTML.
    pub fn render(&self, templates: &TemplateRegistry, site: &SiteConfig) -> Result<String> {
        let template_error = |source| PageError::Template {
            path: self.input_path.clone(),
            source,
        };

        let context = self.context(site);
        let name = self.relative_path.to_string_lossy();

        let body = templates
            .render_str(&name, &self.body, &context)
            .map_err(template_error)?;

        let content = match self.kind {
            PageKind::Html => body,
            PageKind::Markdown => markdown_to_html(&body),
        };

        templates
            .apply_layouts(content, self.frontmatter.layout(), &context)
            .map_err(template_error)
    }
}

/// Convert Markdown to HTML.
#[must_use]
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

    let parser = Parser::new_ext(markdown, options);
    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}

/// Output path for a page, relative to the output directory.
///
/// `about.md` becomes `about/index.html`, `blog/index.md` becomes
/// `blog/index.html`. A permalink ending in `/` gets `index.html` appended;
/// one that would escape the output directory (`../x.html`) is an error.
pub fn output_path_for(relative: &Path, permalink: &Permalink) -> Result<Option<PathBuf>> {
    let output = match permalink {
        Permalink::Disabled => None,
        Permalink::Path(path) => {
            let trimmed = path.trim_start_matches('/');
            let escapes = Path::new(trimmed)
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if escapes {
                return Err(PageError::InvalidPermalink {
                    path: relative.to_path_buf(),
                    permalink: path.clone(),
                });
            }

            if trimmed.is_empty() || trimmed.ends_with('/') {
                Some(Path::new(trimmed).join("index.html"))
            } else {
                Some(PathBuf::from(trimmed))
            }
        }
        Permalink::Default => relative.file_stem().map(|stem| {
            let parent = relative.parent().unwrap_or(Path::new(""));
            if stem == "index" {
                parent.join("index.html")
            } else {
                parent.join(stem).join("index.html")
            }
        }),
    };
    Ok(output)
}

/// Public URL for an output path: `about/index.html` is served as `/about/`.
#[must_use]
pub fn url_for(output: &Path) -> String {
    let path = output.to_string_lossy().replace('\\', "/");
    match path.strip_suffix("index.html") {
        Some(dir) => format!("/{dir}"),
        None => format!("/{path}"),
    }
}
