//! Inline bundle CSS.
//!
//! The bundle stylesheet is compiled at most once per build and reused by
//! every page that inlines it. The cache is cleared by a `BeforeBuild`
//! handler, see [`InlineCssCache::invalidate_before_build`].

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::debug;

use crate::{
    deps::DependencyGraph,
    hooks::{BuildHooks, EventKind},
    stylesheet::{Input, PLACEHOLDER, Resilient, StylesheetCompiler},
};

/// Single-slot cache for the wrapped bundle CSS of the current build.
#[derive(Debug, Default)]
pub struct InlineCssCache {
    slot: Mutex<Option<Arc<str>>>,
}

impl InlineCssCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<str>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the cached value so the next request recompiles.
    pub fn invalidate(&self) {
        if self.slot().take().is_some() {
            debug!("inline CSS cache cleared");
        }
    }

    /// The cached value, if any.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<str>> {
        self.slot().clone()
    }

    /// Return the cached value or compute and store it.
    ///
    /// The slot stays locked while `compute` runs, so concurrent callers
    /// wait for the first result instead of compiling again. Errors are
    /// returned without being cached.
    pub fn get_or_compute<E, F>(&self, compute: F) -> Result<Arc<str>, E>
    where
        F: FnOnce() -> Result<String, E>,
    {
        let mut slot = self.slot();
        if let Some(value) = slot.as_ref() {
            return Ok(Arc::clone(value));
        }

        let value: Arc<str> = compute()?.into();
        *slot = Some(Arc::clone(&value));
        Ok(value)
    }

    /// Subscribe [`Self::invalidate`] to the `BeforeBuild` event.
    pub fn invalidate_before_build(self: &Arc<Self>, hooks: &mut BuildHooks) {
        let cache = Arc::clone(self);
        hooks.on(EventKind::BeforeBuild, move |_| cache.invalidate());
    }
}

/// The `inline_bundle_css` shortcode.
#[derive(Debug, Clone)]
pub struct InlineBundleCss {
    bundle: PathBuf,
    compiler: StylesheetCompiler,
    cache: Arc<InlineCssCache>,
    deps: Arc<DependencyGraph>,
}

impl InlineBundleCss {
    /// Create the shortcode for the bundle at `bundle`.
    #[must_use]
    pub fn new(
        bundle: impl Into<PathBuf>,
        compiler: StylesheetCompiler,
        cache: Arc<InlineCssCache>,
        deps: Arc<DependencyGraph>,
    ) -> Self {
        Self {
            bundle: bundle.into(),
            compiler,
            cache,
            deps,
        }
    }

    /// Path of the bundle entry point.
    #[must_use]
    pub fn bundle(&self) -> &Path {
        &self.bundle
    }

    /// Render the bundle as a `<style>` element, or the placeholder comment
    /// when it does not compile.
    pub fn render(&self) -> String {
        let styled = self.cache.get_or_compute(|| {
            match self.compiler.compile_resilient(Input::File(&self.bundle)) {
                Resilient::Compiled(compilation) => {
                    self.deps
                        .set_dependencies(&self.bundle, compilation.loaded_files());
                    Ok(format!("<style>{}</style>", compilation.css()))
                }
                Resilient::Placeholder => Err(()),
            }
        });

        match styled {
            Ok(styled) => styled.to_string(),
            Err(()) => PLACEHOLDER.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use tempfile::TempDir;

    use super::*;
    use crate::hooks::BuildEvent;

    fn shortcode(dir: &TempDir) -> (InlineBundleCss, Arc<InlineCssCache>) {
        let cache = Arc::new(InlineCssCache::new());
        let shortcode = InlineBundleCss::new(
            dir.path().join("bundle.scss"),
            StylesheetCompiler::new([dir.path()]),
            cache.clone(),
            Arc::new(DependencyGraph::new()),
        );
        (shortcode, cache)
    }

    #[test]
    fn test_get_or_compute_hits_cache() {
        let cache = InlineCssCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>("<style>a{}</style>".to_string())
        };

        let first = cache.get_or_compute(compute).unwrap();
        let second = cache.get_or_compute(compute).unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let cache = InlineCssCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>("css".to_string())
        };

        cache.get_or_compute(compute).unwrap();
        cache.invalidate();
        assert!(cache.cached().is_none());
        cache.get_or_compute(compute).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = InlineCssCache::new();
        assert!(cache.get_or_compute(|| Err::<String, _>("boom")).is_err());
        assert!(cache.cached().is_none());
        assert_eq!(&*cache.get_or_compute(|| Ok::<_, ()>("ok".into())).unwrap(), "ok");
    }

    #[test]
    fn test_before_build_hook_clears_cache() {
        let cache = Arc::new(InlineCssCache::new());
        let mut hooks = BuildHooks::new();
        cache.invalidate_before_build(&mut hooks);

        cache.get_or_compute(|| Ok::<_, ()>("css".into())).unwrap();
        hooks.emit(&BuildEvent::BeforeBuild { incremental: false });

        assert!(cache.cached().is_none());
    }

    #[test]
    fn test_render_wraps_in_style_and_caches() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bundle.scss"), "body { color: red; }").unwrap();
        let (shortcode, cache) = shortcode(&dir);

        let first = shortcode.render();
        assert_eq!(first, "<style>body{color:red}</style>");

        // Source edits are not seen until the cache is invalidated.
        fs::write(dir.path().join("bundle.scss"), "body { color: blue; }").unwrap();
        assert_eq!(shortcode.render(), first);

        cache.invalidate();
        assert_eq!(shortcode.render(), "<style>body{color:blue}</style>");
    }

    #[test]
    fn test_render_broken_bundle_returns_placeholder() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bundle.scss"), "body { color: red;").unwrap();
        let (shortcode, cache) = shortcode(&dir);

        assert_eq!(shortcode.render(), PLACEHOLDER);
        assert!(cache.cached().is_none());
    }

    #[test]
    fn test_render_records_bundle_dependencies() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("_vars.scss"), "$c: red;").unwrap();
        fs::write(dir.path().join("bundle.scss"), "@import \"vars\";\na { color: $c; }").unwrap();

        let deps = Arc::new(DependencyGraph::new());
        let shortcode = InlineBundleCss::new(
            dir.path().join("bundle.scss"),
            StylesheetCompiler::new([dir.path()]),
            Arc::new(InlineCssCache::new()),
            deps.clone(),
        );
        shortcode.render();

        let recorded = deps.dependencies_of(shortcode.bundle());
        assert!(recorded.iter().any(|p| p.ends_with("_vars.scss")));
    }
}
