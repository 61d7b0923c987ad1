//! boldcheck CLI
//!
//! Validate one BOLD acquisition and stage its inputs for the next step.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use boldcheck::config::DEFAULT_CONFIG_FILE;
use boldcheck::{JobConfig, Workspace};

#[derive(Parser)]
#[command(name = "boldcheck")]
#[command(about = "Validate a BOLD fMRI acquisition and stage its inputs", long_about = None)]
struct Cli {
    /// Path to the job configuration, relative to the working directory
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Working directory for inputs and outputs
    #[arg(short, long, default_value = ".")]
    workdir: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    let workspace = Workspace::new(
        std::env::current_dir()
            .context("cannot determine current directory")?
            .join(&cli.workdir),
    );
    let config_path = workspace.resolve(&cli.config);
    let job = JobConfig::from_file(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let report = boldcheck::run(&job, &workspace).context("failed to write report")?;
    if report.has_errors() {
        tracing::info!("finished with {} error(s)", report.errors().len());
    } else {
        tracing::info!("all good");
    }

    Ok(())
}
