//! `podwire` application entry point.
//!
//! A small command-line front end over the library: each subcommand opens a
//! session to the daemon socket, performs one libpod call and prints the
//! result. It uses `eyre` for opaque error handling at the application
//! boundary, converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/podwire/config.toml` or path from `PODWIRE_CONFIG_PATH`)
//! 3. Environment variables (`PODWIRE_*`)
//! 4. Command-line arguments

use clap::Parser;
use eyre::{Report, Result as EyreResult};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method};
use mockable::DefaultEnv;
use bytes::Bytes;
use camino::Utf8Path;
use podwire::client::{PlayKubeOptions, PodmanClient};
use podwire::config::{
    AppConfig, Cli, Commands, DownArgs, LogsArgs, PlayArgs, PsArgs, PullArgs, RequestArgs,
    load_config,
};
use podwire::error::{ApiError, Result as PodwireResult, TransportError};
use podwire::transport::Request;
use tokio::io::{AsyncWriteExt, Stdout, stdout};
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Loads configuration with layered precedence via `OrthoConfig`, then dispatches
/// to the appropriate subcommand handler on a Tokio runtime.
#[tokio::main]
async fn main() -> EyreResult<()> {
    // Parse CLI first (for subcommand dispatch and global options).
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load configuration with layered precedence: defaults < file < env < CLI.
    let config = load_config(&cli).map_err(Report::from)?;

    run(&cli, &config).await.map_err(Report::from)
}

/// Install the `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects debug output.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "podwire=debug" } else { "podwire=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report`.
async fn run(cli: &Cli, config: &AppConfig) -> PodwireResult<()> {
    let client = PodmanClient::from_config(config, &DefaultEnv::new())?;
    let outcome = match &cli.command {
        Commands::Ping => ping(&client).await,
        Commands::Version => version(&client).await,
        Commands::Info => info(&client).await,
        Commands::Ps(args) => list_containers(&client, args).await,
        Commands::Logs(args) => follow_logs(&client, args).await,
        Commands::Pull(args) => pull_image(&client, args).await,
        Commands::Play(args) => play_kube(&client, args).await,
        Commands::Down(args) => kube_down(&client, args).await,
        Commands::Request(args) => raw_request(&client, args).await,
    };
    client.close().await;
    outcome
}

/// Check the daemon answers.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn ping(client: &PodmanClient) -> PodwireResult<()> {
    let reply = client.ping().await?;
    println!("{reply}");
    Ok(())
}

/// Print the daemon version.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn version(client: &PodmanClient) -> PodwireResult<()> {
    let info = client.version().await?;
    println!("Version:     {}", info.version);
    println!("API version: {}", info.api_version);
    println!("OS/Arch:     {}/{}", info.os, info.arch);
    Ok(())
}

/// Print host details.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn info(client: &PodmanClient) -> PodwireResult<()> {
    let info = client.info().await?;
    println!("Hostname: {}", info.host.hostname);
    println!("OS/Arch:  {}/{}", info.host.os, info.host.arch);
    println!("Kernel:   {}", info.host.kernel);
    println!("Engine:   {}", info.version.version);
    Ok(())
}

/// List containers.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn list_containers(client: &PodmanClient, args: &PsArgs) -> PodwireResult<()> {
    let containers = client.list_containers(args.all).await?;
    println!("{:<14} {:<24} {:<10} NAMES", "CONTAINER ID", "IMAGE", "STATE");
    for container in containers {
        let short_id: String = container.id.chars().take(12).collect();
        println!(
            "{short_id:<14} {:<24} {:<10} {}",
            container.image,
            container.state,
            container.names.join(",")
        );
    }
    Ok(())
}

/// Copy a container's log output to stdout as it arrives.
async fn follow_logs(client: &PodmanClient, args: &LogsArgs) -> PodwireResult<()> {
    let mut logs = client.container_logs(&args.container, args.follow).await?;
    let mut out = stdout();
    while let Some(chunk) = logs.next_chunk().await? {
        write_out(&mut out, &chunk).await?;
    }
    Ok(())
}

/// Pull an image, echoing the daemon's progress.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn pull_image(client: &PodmanClient, args: &PullArgs) -> PodwireResult<()> {
    let mut pull = client.pull_image(&args.reference).await?;
    let mut out = stdout();
    while let Some(report) = pull.next_report().await? {
        if !report.stream.is_empty() {
            write_out(&mut out, report.stream.as_bytes()).await?;
        }
        if !report.id.is_empty() {
            println!("{}", report.id);
        }
    }
    Ok(())
}

/// Play Kubernetes YAML, then print each pod's published ports.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn play_kube(client: &PodmanClient, args: &PlayArgs) -> PodwireResult<()> {
    let yaml = read_yaml(&args.file).await?;
    let mut options = PlayKubeOptions::started();
    options.wait = args.wait;
    options.publish_ports.clone_from(&args.publish);
    let report = client.play_kube(yaml, &options).await?;
    if report.pods.is_empty() {
        return Err(ApiError::Stream {
            message: format!("no pods were created from {}", args.file),
        }
        .into());
    }
    for id in report.pod_ids() {
        let pod = client.inspect_pod(id).await?;
        println!("{} {}", pod.name, pod.state);
        for (container, host) in pod.published_ports() {
            println!("  {container} -> 0.0.0.0:{host}");
        }
    }
    Ok(())
}

/// Tear down pods created from Kubernetes YAML.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn kube_down(client: &PodmanClient, args: &DownArgs) -> PodwireResult<()> {
    let yaml = read_yaml(&args.file).await?;
    let report = client.kube_down(yaml, args.force).await?;
    for removed in report.rm_report {
        if removed.error.is_empty() {
            println!("{}", removed.id);
        } else {
            println!("{}: {}", removed.id, removed.error);
        }
    }
    Ok(())
}

async fn read_yaml(path: &Utf8Path) -> PodwireResult<Bytes> {
    let content = tokio::fs::read(path).await.map_err(|e| ApiError::Encode {
        message: format!("failed to read {path}: {e}"),
    })?;
    Ok(Bytes::from(content))
}

/// Send an arbitrary request and print the response body.
///
/// Non-2xx statuses are reported as errors after the body is printed.
async fn raw_request(client: &PodmanClient, args: &RequestArgs) -> PodwireResult<()> {
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes()).map_err(|e| {
        TransportError::InvalidRequest {
            message: format!("invalid method '{}': {e}", args.method),
        }
    })?;
    let mut request = Request::new(method, args.path.as_str())?;
    if let Some(body) = &args.body {
        request = request
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(body.clone());
    }
    let response = client.send(request).await?;
    write_out(&mut stdout(), response.body()).await?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(ApiError::Status {
            status: response.status().as_u16(),
            message: String::from(response.head().reason()),
        }
        .into())
    }
}

async fn write_out(out: &mut Stdout, bytes: &[u8]) -> PodwireResult<()> {
    out.write_all(bytes).await?;
    out.flush().await?;
    Ok(())
}
