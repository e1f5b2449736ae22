//! Aggregator daemon entry point.

use clap::Parser;
use log::{error, info};
use tokio::signal;

use api_aggregator::config::{Cli, Config};
use api_aggregator::discovery::{run_announcer, run_discovery};
use api_aggregator::http_server::{run_http_server, GatewayState};
use api_aggregator::{Registry, UpstreamClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cli = Cli::parse();
    let cfg = Config::load(&cli)?;
    info!("Starting aggregator with config: {:?}", cfg);

    // Shared membership
    let registry = Registry::new();
    let client = UpstreamClient::new(cfg.upstream_timeout())?;

    // HTTP gateway
    let state = GatewayState::new(registry.clone(), client);
    let http_addr = cfg.http_addr;
    let mut http_handle = tokio::spawn(run_http_server(http_addr, state));

    // Discovery listener
    let mut discovery_handle = tokio::spawn(run_discovery(cfg.multicast_addr, registry, None));

    // Announcer
    let announcer_handle = cfg.multicast_ping.map(|target| {
        tokio::spawn(run_announcer(target, http_addr.port(), cfg.multicast_interval()))
    });

    let outcome = tokio::select! {
        res = &mut http_handle => match res {
            Ok(Ok(())) => Err(anyhow::anyhow!("HTTP server stopped")),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(e.into()),
        },
        res = &mut discovery_handle => match res {
            Ok(Ok(())) => Err(anyhow::anyhow!("Discovery listener stopped")),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(e.into()),
        },
        res = signal::ctrl_c() => {
            match res {
                Ok(()) => info!("Received Ctrl+C, shutting down..."),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
            Ok(())
        }
    };

    // Abort tasks
    http_handle.abort();
    discovery_handle.abort();
    if let Some(handle) = announcer_handle {
        handle.abort();
    }

    if let Err(ref e) = outcome {
        error!("Aggregator failed: {}", e);
    } else {
        info!("Shutdown complete.");
    }
    outcome
}
