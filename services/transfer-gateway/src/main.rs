// Transfer Gateway Service
// Starts the transfer engine and serves it over HTTP until Ctrl-C

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use transfer_core::{Config, TransferEngine};
use transfer_gateway::{router, AppState};

#[derive(Parser, Debug)]
#[command(name = "transfer-gateway", version, about = "Transfer engine over HTTP")]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long, env = "TRANSFER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(config.server.log_json);

    info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting transfer gateway"
    );

    let mut engine = TransferEngine::start(&config.engine)?;

    let state = AppState {
        operations: engine.operations(),
        metrics: engine.metrics().clone(),
        service: config.service_name.clone(),
        version: config.service_version.clone(),
    };
    let app = router(state, &config.server)?;

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    info!("Gateway listening on: {}", config.server.listen_addr);
    info!("   POST /account/create   - Open an account");
    info!("   GET  /account/info     - Read a balance");
    info!("   POST /account/transfer - Move money between accounts");
    info!("   GET  /health           - Health check");
    info!("   GET  /metrics          - Prometheus metrics");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Drain the ring even when the server failed
    engine.stop()?;
    info!("Transfer gateway stopped");

    served?;
    Ok(())
}

/// `TRANSFER_*` variables win over the file
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await
        }
    }
}
