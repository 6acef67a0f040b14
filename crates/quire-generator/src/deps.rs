//! File-level dependency tracking for incremental rebuilds.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::trace;

/// Canonicalize a path so watcher events and compiler paths compare equal.
///
/// Falls back to the path as given when it does not exist (e.g. after a delete).
pub fn normalize_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Input file -> files it loaded while compiling.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: Mutex<HashMap<PathBuf, BTreeSet<PathBuf>>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn edges(&self) -> MutexGuard<'_, HashMap<PathBuf, BTreeSet<PathBuf>>> {
        self.edges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `input` depends on each of `dependencies`.
    pub fn add_dependencies<I, P>(&self, input: &Path, dependencies: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let input = normalize_path(input);
        let mut edges = self.edges();
        let entry = edges.entry(input.clone()).or_default();
        for dependency in dependencies {
            let dependency = normalize_path(dependency.as_ref());
            if dependency != input {
                trace!(input = %input.display(), dependency = %dependency.display(), "dependency");
                entry.insert(dependency);
            }
        }
    }

    /// Replace everything recorded for `input`.
    pub fn set_dependencies<I, P>(&self, input: &Path, dependencies: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.forget(input);
        self.add_dependencies(input, dependencies);
    }

    /// Drop everything recorded for `input`.
    pub fn forget(&self, input: &Path) {
        self.edges().remove(&normalize_path(input));
    }

    /// Files `input` depends on, sorted.
    #[must_use]
    pub fn dependencies_of(&self, input: &Path) -> Vec<PathBuf> {
        self.edges()
            .get(&normalize_path(input))
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Inputs that loaded `changed`, sorted.
    #[must_use]
    pub fn dependents_of(&self, changed: &Path) -> Vec<PathBuf> {
        let changed = normalize_path(changed);
        let mut dependents: Vec<_> = self
            .edges()
            .iter()
            .filter(|(_, deps)| deps.contains(&changed))
            .map(|(input, _)| input.clone())
            .collect();
        dependents.sort();
        dependents
    }

    /// The changed files themselves plus every input that depends on one of them.
    #[must_use]
    pub fn affected(&self, changed: &[PathBuf]) -> BTreeSet<PathBuf> {
        let changed: BTreeSet<_> = changed.iter().map(|p| normalize_path(p)).collect();
        let edges = self.edges();

        let mut affected = changed.clone();
        for (input, deps) in edges.iter() {
            if !deps.is_disjoint(&changed) {
                affected.insert(input.clone());
            }
        }
        affected
    }

    /// Number of inputs with recorded dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges().len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
