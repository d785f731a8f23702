//! The switchyard server binary.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use switchyard::utils::toml_config::{ConfigManager, SwitchyardConfig};
use switchyard::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Capability-routed multi-agent orchestration server.
#[derive(Debug, Parser)]
#[command(name = "switchyard-server", version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(long, env = "SWITCHYARD_CONFIG", default_value = "switchyard.toml")]
    config: PathBuf,

    /// Override the configured bind port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config_exists = args.config.exists();
    let config_manager = if config_exists {
        Arc::new(
            ConfigManager::new(&args.config)
                .with_context(|| format!("loading {:?}", args.config))?,
        )
    } else {
        Arc::new(ConfigManager::from_config(SwitchyardConfig::default()))
    };

    let config = config_manager.config();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    if config_exists {
        config_manager.start_watching().ok();
    } else {
        warn!(config = ?args.config, "configuration file not found, using defaults");
    }

    let state = AppState::with_defaults(Arc::clone(&config_manager));
    let _background = state.spawn_background_tasks();

    let host = config.server.host.clone();
    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let app = switchyard::api::routes::create_router().with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "switchyard server listening");

    axum::serve(listener, app)
        .await
        .context("serving HTTP")?;

    Ok(())
}
