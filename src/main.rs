// ABOUTME: Main entry point for the agent bridge daemon
// ABOUTME: Initializes logging, config, and the app; runs until interrupted

use anyhow::Result;
use clap::Parser;
use gantry::{App, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gantry", version, about = "Bridge to an external tool-calling agent")]
struct Args {
    /// Path to the configuration file (defaults to ./gantry.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the agent endpoint for this run
    #[arg(long)]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log panics before they take the process down
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: {}", panic_info);
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(endpoint) = args.endpoint {
        config.bridge.endpoint = Some(endpoint);
    }

    tracing::info!(
        enabled = config.bridge.enabled,
        endpoint = config.bridge.endpoint.as_deref().unwrap_or("<unset>"),
        roots = config.workspace.roots.len(),
        "configuration loaded"
    );

    let app = App::start(config);
    tracing::info!("gantry running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    app.shutdown().await;

    Ok(())
}
