//! Command-line argument definitions for compose-exec.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for compose-exec.
#[derive(Debug, Parser)]
#[command(name = "compose-exec")]
#[command(
    author,
    version,
    about = "Run Compose services as one-shot containers"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,

    /// Path to the Compose project document.
    #[arg(long, short = 'f', global = true)]
    pub project_file: Option<Utf8PathBuf>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a service once and exit with its status.
    Run(RunArgs),

    /// Remove every container and network labelled with a project name.
    Down(DownArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Service name from the project document.
    #[arg(required = true)]
    pub service: String,

    /// Extra `KEY=VALUE` environment entries for the container.
    #[arg(long = "env", short = 'e')]
    pub env: Vec<String>,

    /// Working directory inside the container.
    #[arg(long, short = 'w')]
    pub workdir: Option<String>,

    /// Report once the service healthcheck passes, then keep waiting for exit.
    #[arg(long)]
    pub wait_healthy: bool,

    /// Command arguments; the image or service command is used when empty.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Arguments for the `down` subcommand.
#[derive(Debug, Parser)]
pub struct DownArgs {
    /// Project name; defaults to the discovered project's name.
    pub project: Option<String>,
}
