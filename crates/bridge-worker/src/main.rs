//! CLI entry point for the worker-side lifecycle binary. The `clap` derive
//! style follows the teacher's own `xtask` binary; the `tracing-subscriber`
//! `EnvFilter` setup mirrors `examples/adamtc007-ob-poc`'s logging bootstrap.
//!
//! This binary owns process bring-up only: argument parsing, logging, and
//! handing a [`plugin_bridge::LifecycleController`] to a transport. Wiring a
//! concrete transport (the socket/event-stream client that actually talks to
//! a host) is left to an embedder — it is explicitly out of scope for the
//! bridge itself, so this binary drives the lifecycle over an in-memory
//! transport whose other end a real deployment would replace with its own
//! client implementation.

use std::path::PathBuf;

use clap::Parser;
use plugin_bridge::config::{ChannelSecret, WorkerConfig};
use plugin_bridge::lifecycle::{LifecycleController, DEFAULT_WORKER_COUNT};
use plugin_bridge::transport::in_memory_transport;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Connects a sandboxed plugin worker to its host over the configured
/// channel and runs its dispatch loop until disconnected.
#[derive(Parser, Debug)]
#[command(name = "plugin-worker", version, about)]
struct Cli {
    /// Plugin id used to derive the connection channel name.
    #[arg(long)]
    id: String,

    /// Handshake secret shared with the host.
    #[arg(long)]
    secret: String,

    /// Optional namespace prefix for the channel name.
    #[arg(long)]
    namespace: Option<String>,

    /// Working directory the worker process should run in.
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Host address to connect to.
    #[arg(long, default_value = "http://127.0.0.1:9527")]
    server: String,

    /// Run as a daemon: do not force-exit on transport loss.
    #[arg(long)]
    daemon: bool,

    /// Enable debug-level logging.
    #[arg(long)]
    debug: bool,

    /// Number of worker runners draining the shared work queue.
    #[arg(long, default_value_t = DEFAULT_WORKER_COUNT)]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = WorkerConfig {
        id: cli.id,
        secret: ChannelSecret::parse(&cli.secret)?,
        namespace: cli.namespace,
        work_dir: cli.work_dir,
        server: cli.server,
        daemon: cli.daemon,
        debug: cli.debug,
        workers: cli.workers,
    };

    tracing::info!(channel = %config.channel_name(), server = %config.server, "connecting");

    // A real deployment supplies a transport wired to the host's event
    // stream here; this binary exercises the lifecycle over an in-memory
    // pair so it has something concrete to run end to end.
    let (handle, _peer) = in_memory_transport();
    let controller = LifecycleController::connect(config, &handle).await?;
    controller.wait_forever(handle.inbound, run_task).await?;
    Ok(())
}

async fn run_task(payload: Value) -> Result<(), plugin_bridge::BridgeError> {
    tracing::debug!(?payload, "received task payload");
    Ok(())
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
