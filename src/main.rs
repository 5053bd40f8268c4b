use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use taskshell::config::{TlsConfig, WorkerConfig};
use taskshell::shutdown::install_shutdown_handler;
use taskshell::worker;

#[derive(Parser, Debug)]
#[command(name = "taskshell")]
#[command(version)]
#[command(about = "Shell tasks for a workflow-orchestration runtime")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a worker serving the configured shell tasks
    Worker(WorkerArgs),
}

// =============================================================================
// Worker Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Address of the dispatch service (use https:// with --tls)
    #[arg(
        long,
        default_value = "http://127.0.0.1:7233",
        env = "TASKSHELL_ADDRESS"
    )]
    address: String,

    /// Namespace to poll in
    #[arg(long, short = 'n', default_value = "default", env = "TASKSHELL_NAMESPACE")]
    namespace: String,

    /// Shared task queue; the worker derives its host task queue from it
    #[arg(long, short = 't', env = "TASKSHELL_TASK_QUEUE")]
    task_queue: String,

    /// Task registration, repeatable (format: name=<shell command template>)
    #[arg(
        long = "task",
        short = 'a',
        value_name = "NAME=COMMAND",
        value_parser = parse_task_spec,
        required = true
    )]
    tasks: Vec<(String, String)>,

    /// Maximum number of concurrently executing tasks per poll loop
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Milliseconds between worker heartbeats
    #[arg(long, default_value_t = 30_000)]
    heartbeat_interval_ms: u64,

    // === TLS Options ===
    /// Enable TLS for the dispatch connection
    #[arg(long)]
    tls: bool,

    /// Path to a CA certificate (PEM format) to trust instead of system roots
    #[arg(long, requires = "tls")]
    ca_cert: Option<PathBuf>,

    /// Path to the client certificate (PEM format) for mutual TLS
    #[arg(long, requires = "tls")]
    cert: Option<PathBuf>,

    /// Path to the client private key (PEM format)
    #[arg(long, requires = "tls")]
    key: Option<PathBuf>,

    /// Expected server name when it differs from the dialed host
    #[arg(long, requires = "tls")]
    tls_domain: Option<String>,
}

fn parse_task_spec(spec: &str) -> Result<(String, String), String> {
    match spec.split_once('=') {
        Some((name, command)) if !name.is_empty() && !command.is_empty() => {
            Ok((name.to_string(), command.to_string()))
        }
        _ => Err(format!("expected NAME=COMMAND, got {spec:?}")),
    }
}

async fn run_worker(args: WorkerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.task_queue.is_empty() {
        return Err("task-queue is required".into());
    }

    let mut commands = HashMap::new();
    for (name, command) in args.tasks {
        if commands.insert(name.clone(), command).is_some() {
            return Err(format!("task {name:?} registered twice").into());
        }
    }

    let config = WorkerConfig {
        address: args.address,
        namespace: args.namespace,
        task_queue: args.task_queue,
        concurrency: args.concurrency,
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        commands,
        tls: TlsConfig {
            enabled: args.tls,
            ca_cert_path: args.ca_cert,
            cert_path: args.cert,
            key_path: args.key,
            domain_name: args.tls_domain,
        },
    };

    let shutdown = install_shutdown_handler();
    worker::run(config, shutdown).await?;
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Worker(worker_args) => run_worker(worker_args).await,
    }
}
