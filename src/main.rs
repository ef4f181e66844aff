use anyhow::{Context, Result};
use clap::Arg;
use edgegraft::{
    config::{ProxySettings, DEFAULT_CONFIG_FILE},
    create_router, AppState,
};
use std::{path::Path, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LEVEL: &str = "info";

fn cli() -> clap::Command {
    clap::Command::new("edgegraft")
        .about("Reverse proxy that widens CSP directives and injects HTML into origin responses")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("CONFIG")
                .help("Path to a YAML file containing the proxy settings")
                .default_value(DEFAULT_CONFIG_FILE),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .value_name("ADDR")
                .help("Address to listen on, overrides `listen` from the settings"),
        )
        .arg(
            Arg::new("origin")
                .short('o')
                .long("origin")
                .value_name("URL")
                .help("Origin to proxy to, overrides `origin` from the settings"),
        )
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log filter used when RUST_LOG is not set")
                .default_value(DEFAULT_LOG_LEVEL),
        )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let log_level = matches
        .get_one::<String>("log_level")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_LOG_LEVEL);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_CONFIG_FILE);
    let mut settings = ProxySettings::read(Path::new(config_path))?;

    if let Some(listen) = matches.get_one::<String>("listen") {
        settings.listen = listen.clone();
    }
    if let Some(origin) = matches.get_one::<String>("origin") {
        settings.origin = origin.clone();
    }

    let state = Arc::new(AppState::new(settings).context("Invalid proxy settings")?);

    let listener = tokio::net::TcpListener::bind(&state.settings.listen)
        .await
        .with_context(|| format!("Failed to bind {}", state.settings.listen))?;
    info!(
        "edgegraft listening on {}, proxying to {}",
        state.settings.listen, state.origin
    );

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}
