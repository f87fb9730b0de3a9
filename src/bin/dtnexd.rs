//! DTNEX daemon binary
//!
//! Loads configuration, wires the router adapter, and hands control to
//! the supervisor.

use clap::Parser;
use dtnex::{Config, MemoryRouter, NodeId, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// DTN network information exchange daemon
#[derive(Parser, Debug)]
#[command(name = "dtnexd", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    info!("dtnexd starting");

    let config = if let Some(config_path) = &args.config {
        match Config::load_file(config_path) {
            Ok(config) => {
                info!(path = %config_path.display(), "loaded config file");
                config
            }
            Err(e) => {
                error!("failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok((config, loaded_paths)) => {
                if loaded_paths.is_empty() {
                    warn!("no config files found, using defaults without metadata exchange");
                } else {
                    for path in &loaded_paths {
                        info!(path = %path.display(), "loaded config file");
                    }
                }
                config
            }
            Err(e) => {
                error!("failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    let node_id = match config.router.node_id {
        Some(id) => NodeId::new(id),
        None => {
            error!("router.node_id is required");
            std::process::exit(1);
        }
    };
    let neighbors: Vec<NodeId> = config
        .router
        .neighbors
        .iter()
        .map(|n| NodeId::new(*n))
        .collect();

    info!(node_id = %node_id, neighbors = neighbors.len(), "creating router adapter");
    let router = Arc::new(MemoryRouter::new(node_id, neighbors));

    info!(
        update_interval = config.node.update_interval,
        contact_lifetime = config.node.contact_lifetime,
        service = config.node.service_number,
        "dtnexd running, press Ctrl+C to exit"
    );

    let supervisor = Supervisor::new(config, router);
    match supervisor.run().await {
        Ok(()) => info!("dtnexd shutdown complete"),
        Err(e) => {
            error!("supervisor failed: {}", e);
            std::process::exit(1);
        }
    }
}
