//! Template system for pages and layouts.
//!
//! A deliberately small syntax rather than a full template engine:
//!
//! - `{{ page.title }}` interpolates a value; `{{ subtitle? }}` renders
//!   nothing when the value is missing.
//! - `{{ date | date_ymd }}` pipes a value through registered filters.
//! - `{% inline_bundle_css %}` / `{% entry_body page %}` call registered
//!   shortcodes with quoted strings, numbers or paths as arguments.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use quire_core::{CoreError, Frontmatter, Value, frontmatter::parse_frontmatter};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Maximum number of nested layouts.
pub const MAX_LAYOUT_DEPTH: usize = 10;

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Missing required variable.
    #[error("missing required variable `{name}` in {template}")]
    MissingVariable { template: String, name: String },

    /// Template not found.
    #[error("template not found: {0}")]
    NotFound(String),

    /// Invalid template syntax.
    #[error("invalid template syntax in {template}: {message}")]
    InvalidSyntax { template: String, message: String },

    /// Filter not registered.
    #[error("unknown filter `{0}`")]
    UnknownFilter(String),

    /// Shortcode not registered.
    #[error("unknown shortcode `{0}`")]
    UnknownShortcode(String),

    /// Layouts nest deeper than [`MAX_LAYOUT_DEPTH`], usually a cycle.
    #[error("layout chain starting at {0} is too deep")]
    LayoutDepth(String),

    /// Layout frontmatter could not be parsed.
    #[error(transparent)]
    Frontmatter(#[from] CoreError),

    /// Reading a template failed.
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Walking the layouts directory failed.
    #[error("failed to scan templates: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Transforms a value in `{{ value | filter }}`.
pub type FilterFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Produces text for `{% name args %}`.
pub type ShortcodeFn = Arc<dyn Fn(&[Value]) -> String + Send + Sync>;

/// Template context with variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    variables: BTreeMap<String, Value>,
}

impl TemplateContext {
    /// Create a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable into the context.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Create context with initial variables.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert every entry of `data`, overwriting existing keys.
    pub fn extend(&mut self, data: &BTreeMap<String, Value>) {
        for (key, value) in data {
            self.variables.insert(key.clone(), value.clone());
        }
    }

    /// Resolve a dotted path such as `page.url`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        let value = self.variables.get(head)?;
        match rest {
            Some(rest) => value.lookup(rest),
            None => Some(value),
        }
    }

    /// Check if a top-level variable exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }
}

/// Filters and shortcodes available to templates.
#[derive(Clone, Default)]
pub struct TemplateHelpers {
    filters: HashMap<String, FilterFn>,
    shortcodes: HashMap<String, ShortcodeFn>,
}

impl TemplateHelpers {
    /// Create an empty set of helpers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter.
    pub fn add_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    /// Register a shortcode.
    pub fn add_shortcode<F>(&mut self, name: impl Into<String>, shortcode: F)
    where
        F: Fn(&[Value]) -> String + Send + Sync + 'static,
    {
        self.shortcodes.insert(name.into(), Arc::new(shortcode));
    }

    /// Look up a filter.
    #[must_use]
    pub fn filter(&self, name: &str) -> Option<&FilterFn> {
        self.filters.get(name)
    }

    /// Look up a shortcode.
    #[must_use]
    pub fn shortcode(&self, name: &str) -> Option<&ShortcodeFn> {
        self.shortcodes.get(name)
    }
}

impl fmt::Debug for TemplateHelpers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filters: Vec<_> = self.filters.keys().collect();
        filters.sort();
        let mut shortcodes: Vec<_> = self.shortcodes.keys().collect();
        shortcodes.sort();
        f.debug_struct("TemplateHelpers")
            .field("filters", &filters)
            .field("shortcodes", &shortcodes)
            .finish()
    }
}

/// A token inside a tag.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Quoted(String),
    Bare(String),
}

/// A template with optional frontmatter.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    content: String,
    frontmatter: Frontmatter,
}

impl Template {
    /// Create a new template with the given name and content.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            frontmatter: Frontmatter::default(),
        }
    }

    /// Create a template from a source that may start with frontmatter.
    pub fn parse(name: impl Into<String>, source: &str, path: &Path) -> Result<Self> {
        let (frontmatter, content) = parse_frontmatter(source, path)?;
        Ok(Self {
            name: name.into(),
            content,
            frontmatter,
        })
    }

    /// Get the template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frontmatter of the template itself.
    #[must_use]
    pub fn frontmatter(&self) -> &Frontmatter {
        &self.frontmatter
    }

    /// Render the template with the given context and helpers.
    pub fn render(&self, context: &TemplateContext, helpers: &TemplateHelpers) -> Result<String> {
        let mut output = String::with_capacity(self.content.len());
        let mut rest = self.content.as_str();

        loop {
            let start = match (rest.find("{{"), rest.find("{%")) {
                (None, None) => break,
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) | (None, Some(a)) => a,
            };

            output.push_str(&rest[..start]);
            let tag = &rest[start..];
            let (close, is_output) = if tag.starts_with("{{") {
                ("}}", true)
            } else {
                ("%}", false)
            };

            let end = tag[2..]
                .find(close)
                .ok_or_else(|| self.syntax_error(format!("unclosed {} delimiter", &tag[..2])))?;
            let inner = tag[2..2 + end].trim();

            if is_output {
                output.push_str(&self.render_expression(inner, context, helpers)?);
            } else {
                output.push_str(&self.render_shortcode(inner, context, helpers)?);
            }

            rest = &tag[2 + end + close.len()..];
        }

        output.push_str(rest);
        Ok(output)
    }

    /// Evaluate `subject | filter | ...`, with an optional trailing `?`.
    fn render_expression(
        &self,
        inner: &str,
        context: &TemplateContext,
        helpers: &TemplateHelpers,
    ) -> Result<String> {
        let (expression, optional) = match inner.strip_suffix('?') {
            Some(stripped) => (stripped.trim_end(), true),
            None => (inner, false),
        };

        let mut parts = split_unquoted(expression, '|').into_iter().map(str::trim);
        let subject = parts.next().unwrap_or_default();
        let filters: Vec<&str> = parts.collect();

        let mut tokens = self.tokenize(subject)?;
        if tokens.len() != 1 {
            return Err(self.syntax_error(format!("expected one value in `{{{{ {inner} }}}}`")));
        }
        let token = tokens.remove(0);

        let mut value = match resolve(&token, context) {
            Some(value) => value,
            None if optional || !filters.is_empty() => Value::Null,
            None => {
                return Err(TemplateError::MissingVariable {
                    template: self.name.clone(),
                    name: subject.to_string(),
                });
            }
        };

        for name in filters {
            if name.is_empty() {
                return Err(self.syntax_error(format!("empty filter in `{{{{ {inner} }}}}`")));
            }
            let filter = helpers
                .filter(name)
                .ok_or_else(|| TemplateError::UnknownFilter(name.to_string()))?;
            value = filter(&value);
        }

        Ok(value.to_string())
    }

    /// Call `name arg...` as a shortcode.
    fn render_shortcode(
        &self,
        inner: &str,
        context: &TemplateContext,
        helpers: &TemplateHelpers,
    ) -> Result<String> {
        let mut tokens = self.tokenize(inner)?.into_iter();
        let name = match tokens.next() {
            Some(Token::Bare(name)) => name,
            _ => return Err(self.syntax_error("expected a shortcode name after `{%`")),
        };

        let shortcode = helpers
            .shortcode(&name)
            .ok_or_else(|| TemplateError::UnknownShortcode(name.clone()))?;

        let args: Vec<Value> = tokens
            .map(|token| resolve(&token, context).unwrap_or_default())
            .collect();

        Ok(shortcode(&args))
    }

    /// Split on whitespace, keeping quoted strings together.
    fn tokenize(&self, input: &str) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut chars = input.chars().peekable();

        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
                continue;
            }

            if c == '"' || c == '\'' {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == c => break,
                        Some(ch) => text.push(ch),
                        None => return Err(self.syntax_error("unterminated string literal")),
                    }
                }
                tokens.push(Token::Quoted(text));
            } else {
                let mut text = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() {
                        break;
                    }
                    text.push(ch);
                    chars.next();
                }
                tokens.push(Token::Bare(text));
            }
        }

        Ok(tokens)
    }

    fn syntax_error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::InvalidSyntax {
            template: self.name.clone(),
            message: message.into(),
        }
    }
}

/// Split `input` on `separator` outside of quotes.
fn split_unquoted(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote = None;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == separator => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            None => {}
        }
    }

    parts.push(&input[start..]);
    parts
}

/// Turn a token into a value: literals as-is, bare words as context paths.
fn resolve(token: &Token, context: &TemplateContext) -> Option<Value> {
    match token {
        Token::Quoted(text) => Some(Value::String(text.clone())),
        Token::Bare(word) => match word.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ if word.starts_with(|c: char| c.is_ascii_digit() || c == '-') => {
                word.parse::<f64>().ok().map(Value::Number)
            }
            _ => context.get(word).cloned(),
        },
    }
}

/// Registry of templates by name, plus the helpers they render with.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
    helpers: TemplateHelpers,
}

impl TemplateRegistry {
    /// Create an empty registry with no helpers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry rendering with `helpers`.
    #[must_use]
    pub fn with_helpers(helpers: TemplateHelpers) -> Self {
        Self {
            templates: HashMap::new(),
            helpers,
        }
    }

    /// Register every file under `dir`, named by its `/`-separated relative path.
    ///
    /// Returns the number of templates loaded. A missing directory loads nothing.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "template directory does not exist, skipping");
            return Ok(0);
        }

        let mut count = 0;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let name = relative.to_string_lossy().replace('\\', "/");

            let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            self.register(Template::parse(name, &source, path)?);
            count += 1;
        }

        debug!(dir = %dir.display(), count, "loaded templates");
        Ok(count)
    }

    /// Register a template.
    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Get a template by name. `base` also finds `base.html`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates
            .get(name)
            .or_else(|| self.templates.get(&format!("{name}.html")))
    }

    /// Helpers used for rendering.
    #[must_use]
    pub fn helpers(&self) -> &TemplateHelpers {
        &self.helpers
    }

    /// Render a named template with the given context.
    pub fn render(&self, name: &str, context: &TemplateContext) -> Result<String> {
        let template = self
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        template.render(context, &self.helpers)
    }

    /// Render a template source that is not registered.
    pub fn render_str(&self, name: &str, source: &str, context: &TemplateContext) -> Result<String> {
        Template::new(name, source).render(context, &self.helpers)
    }

    /// Wrap `content` in `layout` and whatever layouts it declares in turn.
    ///
    /// Each layout sees the page context plus `content`, and its own
    /// frontmatter fields where the page does not define them.
    pub fn apply_layouts(
        &self,
        mut content: String,
        layout: Option<&str>,
        context: &TemplateContext,
    ) -> Result<String> {
        let Some(first) = layout else {
            return Ok(content);
        };

        let mut context = context.clone();
        let mut next = Some(first.to_string());
        let mut depth = 0;

        while let Some(name) = next {
            depth += 1;
            if depth > MAX_LAYOUT_DEPTH {
                return Err(TemplateError::LayoutDepth(first.to_string()));
            }

            let template = self
                .get(&name)
                .ok_or_else(|| TemplateError::NotFound(name.clone()))?;

            for (key, value) in template.frontmatter.data() {
                if key != "layout" && !context.contains(key) {
                    context.insert(key.clone(), value.clone());
                }
            }
            context.insert("content", content);

            content = template.render(&context, &self.helpers)?;
            next = template.frontmatter.layout().map(str::to_string);
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn helpers() -> TemplateHelpers {
        let mut helpers = TemplateHelpers::new();
        helpers.add_filter("upper", |v| Value::from(v.to_string().to_uppercase()));
        helpers.add_filter("or_default", |v| {
            if v.is_truthy() {
                v.clone()
            } else {
                Value::from("default")
            }
        });
        helpers.add_shortcode("join", |args| {
            args.iter().map(Value::to_string).collect::<Vec<_>>().join("+")
        });
        helpers
    }

    #[test]
    fn test_simple_interpolation() {
        let template = Template::new("test", "Hello, {{ name }}!");
        let context = TemplateContext::new().with_var("name", "World");

        let result = template.render(&context, &helpers()).unwrap();
        assert_eq!(result, "Hello, World!");
    }

    #[test]
    fn test_dotted_paths() {
        let mut page = Value::map();
        page.insert("url", "/about/");
        let context = TemplateContext::new().with_var("page", page);

        let template = Template::new("test", "<a href=\"{{ page.url }}\">");
        assert_eq!(
            template.render(&context, &helpers()).unwrap(),
            "<a href=\"/about/\">"
        );
    }

    #[test]
    fn test_missing_required_variable() {
        let template = Template::new("post.html", "Hello, {{ name }}!");
        let err = template
            .render(&TemplateContext::new(), &helpers())
            .unwrap_err();

        assert!(matches!(err, TemplateError::MissingVariable { ref name, .. } if name == "name"));
        assert!(err.to_string().contains("post.html"));
    }

    #[test]
    fn test_optional_variable() {
        let template = Template::new("test", "Hello{{ suffix? }}!");
        let result = template.render(&TemplateContext::new(), &helpers()).unwrap();
        assert_eq!(result, "Hello!");
    }

    #[test]
    fn test_filter_chain() {
        let template = Template::new("test", "{{ name | upper }} {{ missing | or_default | upper }}");
        let context = TemplateContext::new().with_var("name", "quire");

        let result = template.render(&context, &helpers()).unwrap();
        assert_eq!(result, "QUIRE DEFAULT");
    }

    #[test]
    fn test_literal_subject_with_pipe_inside_quotes() {
        let template = Template::new("test", "{{ \"a|b\" | upper }}");
        let result = template.render(&TemplateContext::new(), &helpers()).unwrap();
        assert_eq!(result, "A|B");
    }

    #[test]
    fn test_unknown_filter() {
        let template = Template::new("test", "{{ name | nope }}");
        let context = TemplateContext::new().with_var("name", "x");
        let err = template.render(&context, &helpers()).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownFilter(name) if name == "nope"));
    }

    #[test]
    fn test_shortcode_arguments() {
        let template = Template::new("test", "{% join 'a b' 42 flag title missing %}");
        let context = TemplateContext::new()
            .with_var("title", "T")
            .with_var("flag", true);

        let result = template.render(&context, &helpers()).unwrap();
        assert_eq!(result, "a b+42+true+T+");
    }

    #[test]
    fn test_unknown_shortcode() {
        let template = Template::new("test", "{% nope %}");
        let err = template
            .render(&TemplateContext::new(), &helpers())
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnknownShortcode(name) if name == "nope"));
    }

    #[test]
    fn test_unclosed_delimiters() {
        for source in ["{{ name", "{% join", "{% join 'open %}"] {
            let template = Template::new("test", source);
            let err = template
                .render(&TemplateContext::new(), &helpers())
                .unwrap_err();
            assert!(matches!(err, TemplateError::InvalidSyntax { .. }), "{source}");
        }
    }

    #[test]
    fn test_output_is_not_rescanned() {
        let mut helpers = helpers();
        helpers.add_shortcode("braces", |_| "{{ not_a_var }}".to_string());

        let template = Template::new("test", "{% braces %}");
        let result = template.render(&TemplateContext::new(), &helpers).unwrap();
        assert_eq!(result, "{{ not_a_var }}");
    }

    #[test]
    fn test_layout_chain() {
        let mut registry = TemplateRegistry::with_helpers(helpers());
        registry.register(
            Template::parse(
                "post.html",
                "---\nlayout: base\nsection: Blog\n---\n<article>{{ content }}</article>",
                Path::new("post.html"),
            )
            .unwrap(),
        );
        registry.register(Template::new(
            "base.html",
            "<title>{{ title }} | {{ section }}</title><main>{{ content }}</main>",
        ));

        let context = TemplateContext::new().with_var("title", "Hi");
        let html = registry
            .apply_layouts("<p>x</p>".to_string(), Some("post.html"), &context)
            .unwrap();

        assert_eq!(
            html,
            "<title>Hi | Blog</title><main><article><p>x</p></article></main>"
        );
    }

    #[test]
    fn test_layout_cycle_is_rejected() {
        let mut registry = TemplateRegistry::new();
        registry.register(
            Template::parse("a.html", "---\nlayout: a.html\n---\n{{ content }}", Path::new("a"))
                .unwrap(),
        );

        let err = registry
            .apply_layouts(String::new(), Some("a.html"), &TemplateContext::new())
            .unwrap_err();
        assert!(matches!(err, TemplateError::LayoutDepth(_)));
    }

    #[test]
    fn test_missing_layout() {
        let registry = TemplateRegistry::new();
        let err = registry
            .apply_layouts(String::new(), Some("nope"), &TemplateContext::new())
            .unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(name) if name == "nope"));
    }

    #[test]
    fn test_load_dir_names_by_relative_path() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("partials")).unwrap();
        fs::write(dir.path().join("base.html"), "{{ content }}").unwrap();
        fs::write(dir.path().join("partials/nav.html"), "<nav></nav>").unwrap();

        let mut registry = TemplateRegistry::new();
        assert_eq!(registry.load_dir(dir.path()).unwrap(), 2);
        assert!(registry.get("base").is_some());
        assert!(registry.get("partials/nav.html").is_some());

        let missing = dir.path().join("missing");
        assert_eq!(registry.load_dir(&missing).unwrap(), 0);
    }
}
