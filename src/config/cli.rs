//! Command-line argument definitions for podwire.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for podwire.
#[derive(Debug, Parser)]
#[command(name = "podwire")]
#[command(
    author,
    version,
    about = "Talk to a Podman daemon over its Unix socket"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Daemon socket, as `unix:///path` or an absolute path.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,

    /// libpod API version prefix, such as `v5.0.0`.
    #[arg(long, global = true)]
    pub api_version: Option<String>,

    /// Log transport activity at debug level.
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check that the daemon answers.
    Ping,

    /// Show the daemon version.
    Version,

    /// Show host details.
    Info,

    /// List containers.
    Ps(PsArgs),

    /// Print a container's logs.
    Logs(LogsArgs),

    /// Pull an image.
    Pull(PullArgs),

    /// Create and start pods from Kubernetes YAML.
    Play(PlayArgs),

    /// Stop and remove pods created from Kubernetes YAML.
    Down(DownArgs),

    /// Send a raw request and print the response body.
    Request(RequestArgs),
}

/// Arguments for the `ps` subcommand.
#[derive(Debug, Parser)]
pub struct PsArgs {
    /// Include stopped containers.
    #[arg(long, short)]
    pub all: bool,
}

/// Arguments for the `logs` subcommand.
#[derive(Debug, Parser)]
pub struct LogsArgs {
    /// Container ID or name.
    #[arg(required = true)]
    pub container: String,

    /// Keep streaming new output.
    #[arg(long, short)]
    pub follow: bool,
}

/// Arguments for the `pull` subcommand.
#[derive(Debug, Parser)]
pub struct PullArgs {
    /// Image reference, such as `quay.io/podman/hello`.
    #[arg(required = true)]
    pub reference: String,
}

/// Arguments for the `play` subcommand.
#[derive(Debug, Parser)]
pub struct PlayArgs {
    /// Kubernetes YAML file.
    #[arg(required = true)]
    pub file: Utf8PathBuf,

    /// Port to publish, as `containerPort` or `hostPort:containerPort`.
    #[arg(long = "publish", short = 'p')]
    pub publish: Vec<String>,

    /// Keep running until the pods exit, then remove them.
    #[arg(long)]
    pub wait: bool,
}

/// Arguments for the `down` subcommand.
#[derive(Debug, Parser)]
pub struct DownArgs {
    /// Kubernetes YAML file used to create the pods.
    #[arg(required = true)]
    pub file: Utf8PathBuf,

    /// Remove the pods' volumes as well.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `request` subcommand.
#[derive(Debug, Parser)]
pub struct RequestArgs {
    /// HTTP method.
    #[arg(required = true)]
    pub method: String,

    /// Request path, including any query string.
    #[arg(required = true)]
    pub path: String,

    /// JSON request body.
    #[arg(long)]
    pub body: Option<String>,
}
