//! The `quire` command line.
//!
//! [`cmd::build`] runs one full build and reports per-file failures;
//! [`cmd::watch`] keeps a [`Builder`] alive, rebuilds incrementally on file
//! events, and pushes `reload` / `css-reload` messages through [`server`].
//!
//! ```no_run
//! use std::path::Path;
//!
//! let stats = quire::cmd::build::run(Path::new("quire.toml"), None, false).unwrap();
//! for failure in &stats.failures {
//!     eprintln!("{}: {}", failure.path.display(), failure.message);
//! }
//! ```

pub mod cmd;
pub mod server;

pub use quire_core::Config;
pub use quire_generator::{BuildStats, Builder};

/// Install the global subscriber. Each `-v` raises the floor from WARN
/// (INFO, DEBUG, then TRACE); `RUST_LOG` directives still apply on top.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
