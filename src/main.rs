use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stream_autopilot::config::Config;
use stream_autopilot::scheduler::AutomationEngine;
use stream_autopilot::web::WebServer;

#[derive(Parser)]
#[command(name = "stream-autopilot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Automation engine for IPTV stream curation")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Data directory (overrides config file and CONFIG_DIR)
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stream_autopilot={}", cli.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting stream-autopilot v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    info!("Using data directory: {}", config.storage.data_dir.display());

    let engine = AutomationEngine::new(&config).await?;
    let cancel = engine.cancellation_token();

    let web_server = WebServer::new(&config, engine.clone())?;
    let handles = engine.start().await;
    info!("Engine started with {} background task(s)", handles.len());

    // Shut the engine down on SIGINT/SIGTERM
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            let terminate = async {
                #[cfg(unix)]
                {
                    let mut sigterm = tokio::signal::unix::signal(
                        tokio::signal::unix::SignalKind::terminate(),
                    )
                    .expect("failed to install SIGTERM handler");
                    sigterm.recv().await;
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate => {}
            }
            info!("Shutdown signal received");
            engine.shutdown();
        });
    }

    if let Err(e) = web_server.serve(cancel).await {
        error!("Web server failed: {e}");
        engine.shutdown();
    }

    // Workers drain their current task and release leases before exiting
    for handle in handles {
        let _ = handle.await;
    }
    info!("Shutdown complete");
    Ok(())
}
