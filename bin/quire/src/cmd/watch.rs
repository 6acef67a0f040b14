//! Watch command - development server with live reload

use std::{
    collections::BTreeSet,
    fs,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use color_eyre::eyre::{Result, WrapErr};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher, event::ModifyKind};
use quire_generator::{BuildStats, Builder, EventKind as BuildEventKind, deps::normalize_path};
use tokio::{net::TcpListener, sync::mpsc};

use super::load_config;
use crate::server::{ServerState, create_router, inject_livereload};

/// Debounce interval for file changes.
const DEBOUNCE_MS: u64 = 200;

/// Run the watch command.
///
/// Builds once, then serves the output directory and rebuilds incrementally
/// on changes. Stylesheet-only changes trigger a CSS reload in the browser.
pub async fn run(config_path: &Path, port: u16, open_browser: bool) -> Result<()> {
    tracing::info!(?config_path, port, "Starting watch mode");

    let (mut config, root) = load_config(config_path)?;

    // Enable drafts in development mode
    config.build.drafts = true;

    let mut builder = Builder::new(config, root);
    let output_dir = builder.output_dir().to_path_buf();

    let hook_output = output_dir.clone();
    builder.on(BuildEventKind::AfterBuild, move |_| {
        if let Err(e) = inject_livereload_into_html(&hook_output) {
            tracing::error!(error = %e, "Failed to inject live reload script");
        }
    });

    // Initial build
    tracing::info!("Running initial build...");
    let stats = builder.build().wrap_err("Initial build failed")?;
    print_build_stats(&stats);

    let builder = Arc::new(builder);
    let state = Arc::new(ServerState::new());

    // Setup file watcher
    let (tx, rx) = mpsc::channel::<Vec<PathBuf>>(64);
    let ignored = normalize_path(&output_dir);
    let watch_root = normalize_path(builder.root());

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| {
            let Ok(event) = res else {
                return;
            };

            if !matches!(
                event.kind,
                EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Name(_))
                    | EventKind::Create(_)
                    | EventKind::Remove(_)
            ) {
                return;
            }

            let paths = relevant_paths(event.paths, &watch_root, &ignored);
            if !paths.is_empty() {
                let _ = tx.blocking_send(paths);
            }
        },
        notify::Config::default(),
    )
    .wrap_err("Failed to create file watcher")?;

    for target in builder.watch_targets() {
        if !target.exists() {
            tracing::debug!(target = %target.display(), "Watch target does not exist");
            continue;
        }

        let target = normalize_path(&target);
        watcher
            .watch(&target, RecursiveMode::Recursive)
            .wrap_err_with(|| format!("Failed to watch {}", target.display()))?;
        tracing::debug!(target = %target.display(), "Watching");
    }

    tokio::spawn(rebuild_loop(rx, Arc::clone(&builder), Arc::clone(&state)));

    // Start server
    let app = create_router(&output_dir, state);
    let addr = format!("127.0.0.1:{port}");

    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;

    println!();
    println!("  Dev server running at http://{addr}");
    println!("  Press Ctrl+C to stop");
    println!();

    if open_browser {
        let _ = open::that(format!("http://{addr}"));
    }

    // Keep watcher alive
    let _watcher = watcher;

    axum::serve(listener, app).await.wrap_err("Server error")?;

    Ok(())
}

/// Drop paths inside the output directory and anything hidden below `root`.
fn relevant_paths(paths: Vec<PathBuf>, root: &Path, ignored: &Path) -> Vec<PathBuf> {
    paths
        .into_iter()
        .map(|path| normalize_path(&path))
        .filter(|path| !path.starts_with(ignored))
        .filter(|path| !is_hidden(path.strip_prefix(root).unwrap_or(path)))
        .collect()
}

/// Whether any component of `path` is a dotfile or dot-directory.
fn is_hidden(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Collect debounced changes and rebuild on a blocking thread.
async fn rebuild_loop(
    mut rx: mpsc::Receiver<Vec<PathBuf>>,
    builder: Arc<Builder>,
    state: Arc<ServerState>,
) {
    while let Some(first) = rx.recv().await {
        let mut changed: BTreeSet<PathBuf> = first.into_iter().collect();

        // Debounce, then drain anything that queued up meanwhile
        tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS)).await;
        while let Ok(more) = rx.try_recv() {
            changed.extend(more);
        }

        let changed: Vec<PathBuf> = changed.into_iter().collect();
        let css_only = builder.is_stylesheet_only(&changed);

        println!();
        println!("  {} file(s) changed, rebuilding...", changed.len());

        let task_builder = Arc::clone(&builder);
        let result =
            tokio::task::spawn_blocking(move || task_builder.build_incremental(&changed)).await;

        match result {
            Ok(Ok(stats)) => {
                println!(
                    "  ✓ Rebuilt {} pages and {} stylesheets in {}ms",
                    stats.pages, stats.stylesheets, stats.duration_ms
                );
                for failure in &stats.failures {
                    eprintln!("  ✗ {}: {}", failure.path.display(), failure.message);
                }

                if css_only {
                    state.notify_css_reload();
                } else {
                    state.notify_reload();
                }
            }
            Ok(Err(e)) => {
                tracing::error!("Rebuild failed: {e}");
                eprintln!("  ✗ Rebuild failed: {e}");
            }
            Err(e) => {
                tracing::error!("Rebuild task panicked: {e}");
            }
        }
    }
}

/// Print build statistics in a user-friendly format.
fn print_build_stats(stats: &BuildStats) {
    println!();
    println!("  Build Statistics:");
    println!("  ─────────────────────────────────");
    println!("  Pages:        {:>6}", stats.pages);
    println!("  Stylesheets:  {:>6}", stats.stylesheets);
    println!("  Partials:     {:>6}", stats.partials);
    println!("  Passthrough:  {:>6}", stats.passthrough);
    println!("  Failures:     {:>6}", stats.failures.len());
    println!("  ─────────────────────────────────");
    println!("  Duration:     {:>6}ms", stats.duration_ms);
    println!();

    for failure in &stats.failures {
        println!("  ✗ {}: {}", failure.path.display(), failure.message);
    }
}

/// Inject the livereload script into all HTML files in the output directory.
fn inject_livereload_into_html(output_dir: &Path) -> Result<usize> {
    let mut injected = 0;

    for entry in walkdir::WalkDir::new(output_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "html"))
    {
        let path = entry.path();
        let content = fs::read_to_string(path)?;

        if let Some(modified) = inject_livereload(&content) {
            fs::write(path, modified)?;
            injected += 1;
        }
    }

    tracing::debug!(injected, "Injected live reload script");
    Ok(injected)
}
