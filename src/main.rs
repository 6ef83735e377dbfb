use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use meetcast::auth::NatsAuthResolver;
use meetcast::nats::BusClient;
use meetcast::session::RelayFactory;
use meetcast::stream::{ManagerCommand, ManagerOptions, StreamManager};
use meetcast::{create_router, AppState, Config};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

const OUTBOUND_BUFFER: usize = 256;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "meetcast", about = "Meeting live-stream session manager", version)]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "config/meetcast")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let bus = BusClient::connect(cfg.bus.clone()).await?;
    let resolver = Arc::new(NatsAuthResolver::new(bus.client(), cfg.auth.clone()));
    let factory = Arc::new(RelayFactory::new(cfg.relay.clone()));

    let options = ManagerOptions {
        token_timeout: Duration::from_secs(cfg.auth.token_timeout_secs),
        exchange_timeout: Duration::from_secs(cfg.auth.exchange_timeout_secs),
    };
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let manager = StreamManager::new(options, factory, resolver, outbound_tx);
    let commands = manager.commands();

    tokio::spawn(bus.clone().run_publisher(outbound_rx));
    {
        let bus = bus.clone();
        let commands = commands.clone();
        tokio::spawn(async move {
            if let Err(e) = bus.run_control(commands).await {
                error!("Control consumer failed: {}", e);
            }
        });
    }
    {
        let bus = bus.clone();
        let commands = commands.clone();
        tokio::spawn(async move {
            if let Err(e) = bus.run_termination(commands).await {
                error!("Termination consumer failed: {}", e);
            }
        });
    }

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
    info!("HTTP status surface listening on {}", addr);
    let app = create_router(AppState::new(commands.clone()));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server failed: {}", e);
        }
    });

    tokio::spawn(manager.run());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let (respond_to, ack) = oneshot::channel();
    match commands.send(ManagerCommand::Shutdown { respond_to }).await {
        Ok(()) => match tokio::time::timeout(SHUTDOWN_GRACE, ack).await {
            Ok(_) => info!("Stream manager shut down cleanly"),
            Err(_) => warn!("Stream manager did not acknowledge shutdown in time"),
        },
        Err(_) => warn!("Stream manager already stopped"),
    }

    Ok(())
}
