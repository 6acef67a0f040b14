//! Quire CLI
//!
//! Single binary static site generator with an inline Sass pipeline.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use clap::Parser;
use color_eyre::eyre::{Result, bail};

/// Command-line interface for Quire.
#[derive(Parser)]
#[command(
    name = "quire",
    version,
    about = "A static site generator with inline Sass and live reload"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = quire_core::config::CONFIG_FILE)]
    config: std::path::PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build the site
    Build {
        /// Output directory (defaults to `dirs.output`)
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
        /// Include draft pages
        #[arg(long)]
        drafts: bool,
    },
    /// Start development server with live reload
    Watch {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
        /// Open browser automatically
        #[arg(long)]
        open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    quire::init_tracing(cli.verbose);

    match cli.command {
        Commands::Build { output, drafts } => {
            let stats = quire::cmd::build::run(&cli.config, output.as_deref(), drafts)?;
            if !stats.is_success() {
                bail!("{} file(s) failed to build", stats.failures.len());
            }
        }
        Commands::Watch { port, open } => {
            quire::cmd::watch::run(&cli.config, port, open).await?;
        }
    }

    Ok(())
}
