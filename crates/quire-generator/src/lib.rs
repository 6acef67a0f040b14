//! Quire Generator Library
//!
//! Static site generation engine for Quire.
//!
//! # Modules
//!
//! - [`build`] - Full and incremental build orchestration
//! - [`stylesheet`] - Sass/SCSS compilation with strict and resilient modes
//! - [`inline_css`] - The `inline_bundle_css` shortcode and its per-build cache
//! - [`extension`] - Custom template formats keyed by file extension
//! - [`hooks`] - Build lifecycle events
//! - [`deps`] - File dependency tracking for incremental rebuilds
//! - [`template`] - Template system with filters, shortcodes and layouts
//! - [`filters`] / [`shortcodes`] - Built-in template helpers
//! - [`pages`] - HTML and Markdown pages
//! - [`passthrough`] - Verbatim copy of static files

pub mod build;
pub mod deps;
pub mod extension;
pub mod filters;
pub mod hooks;
pub mod inline_css;
pub mod pages;
pub mod passthrough;
pub mod shortcodes;
pub mod stylesheet;
pub mod template;

pub use build::{BuildError, BuildStats, Builder, FileFailure};
pub use deps::DependencyGraph;
pub use extension::{ExtensionHandler, ExtensionRegistry, StylesheetExtension};
pub use hooks::{BuildEvent, BuildHooks, EventKind};
pub use inline_css::{InlineBundleCss, InlineCssCache};
pub use pages::Page;
pub use passthrough::PassthroughCopy;
pub use stylesheet::{Compilation, Resilient, StylesheetCompiler, StylesheetError};
pub use template::{Template, TemplateContext, TemplateHelpers, TemplateRegistry};
