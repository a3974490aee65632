//! Tiny service node - serves the `tiny_service` object over TCP
//!
//! Usage:
//!   tiny_service --config config/tiny_service.toml
//!   tiny_service --bind 127.0.0.1:22222 --log-level debug

mod service;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rrlite_config::NodeConfig;
use rrlite_network::{Node, TcpTransport};
use service::TinyService;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// How long open connections get to close after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "tiny_service")]
#[command(about = "RRLite demonstration service node")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error or a full directive)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config = NodeConfig::load(args.config.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    if let Some(bind) = args.bind {
        config.tcp.bind_address = bind;
    }
    info!(node_name = %config.node_name, bind = %config.tcp.bind_address, "starting tiny service");

    // the node loop blocks in poll, so it gets its own thread
    let stop = Arc::new(AtomicBool::new(false));
    let node_stop = Arc::clone(&stop);
    let mut node_task = tokio::task::spawn_blocking(move || run_node(&config, &node_stop));

    tokio::select! {
        result = &mut node_task => {
            return result.context("node thread panicked")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("received shutdown signal");
        }
    }

    stop.store(true, Ordering::Relaxed);
    node_task.await.context("node thread panicked")?
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {level:?}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}

fn run_node(config: &NodeConfig, stop: &AtomicBool) -> Result<()> {
    let mut node = Node::from_config(config)?;
    let mut transport = TcpTransport::for_node(&node)?;
    let addr = transport.listen_config(&config.tcp)?;
    info!(%addr, node_id = %node.node_id(), "tiny service listening");

    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let mut service = TinyService::default();

    while !stop.load(Ordering::Relaxed) {
        transport.run_once(&mut node, Some(poll_interval))?;
        service.dispatch_cycle(&mut node)?;
    }

    // stop accepting, let the open connections close
    node.shutdown();
    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while !node.pool().is_empty() && Instant::now() < deadline {
        transport.poll(&node, Some(Duration::from_millis(10)))?;
        transport.communicate(&mut node);
        service.dispatch_cycle(&mut node)?;
    }

    info!(d1 = service.d1(), open = node.pool().len(), "tiny service stopped");
    Ok(())
}
