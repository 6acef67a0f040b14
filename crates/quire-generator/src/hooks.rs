//! Build lifecycle events.
//!
//! Handlers are registered per [`EventKind`] and run synchronously, in
//! registration order, on the thread that drives the build.

use std::{collections::HashMap, fmt, path::PathBuf};

use tracing::trace;

use crate::build::BuildStats;

/// A lifecycle event fired by the builder.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    /// A build is about to start.
    BeforeBuild {
        /// Whether this build only refreshes what changed.
        incremental: bool,
    },
    /// A build finished, possibly with per-file failures.
    AfterBuild {
        /// Statistics of the finished build.
        stats: BuildStats,
    },
    /// Watch mode noticed changes and is about to rebuild.
    BeforeWatch {
        /// Files reported by the watcher.
        changed: Vec<PathBuf>,
    },
}

impl BuildEvent {
    /// The kind handlers subscribe to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::BeforeBuild { .. } => EventKind::BeforeBuild,
            Self::AfterBuild { .. } => EventKind::AfterBuild,
            Self::BeforeWatch { .. } => EventKind::BeforeWatch,
        }
    }
}

/// Event kinds handlers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`BuildEvent::BeforeBuild`].
    BeforeBuild,
    /// See [`BuildEvent::AfterBuild`].
    AfterBuild,
    /// See [`BuildEvent::BeforeWatch`].
    BeforeWatch,
}

/// Lifecycle handler.
pub type Handler = Box<dyn Fn(&BuildEvent) + Send + Sync>;

/// Registry of lifecycle handlers.
#[derive(Default)]
pub struct BuildHooks {
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl BuildHooks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to events of `kind`.
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&BuildEvent) + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Run every handler subscribed to the event's kind.
    pub fn emit(&self, event: &BuildEvent) {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            return;
        };

        trace!(kind = ?event.kind(), handlers = handlers.len(), "emitting build event");
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of handlers subscribed to `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for BuildHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self
            .handlers
            .iter()
            .map(|(kind, handlers)| (kind, handlers.len()))
            .collect();
        f.debug_struct("BuildHooks").field("handlers", &counts).finish()
    }
}
