use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use agproxy_core::ProxyEngine;
use agproxy_router::proxy_router;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("agproxy failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let config = cli.proxy_config();
    info!(
        backend = %config.backend_url,
        discovery = ?config.discovery_urls,
        state_db = %config.state_db.display(),
        static_token = config.static_token.is_some(),
        proxy = %config.proxy.as_deref().unwrap_or(""),
        "config loaded"
    );

    let engine = Arc::new(ProxyEngine::from_config(&config)?);
    let app = proxy_router(engine);

    let bind = cli.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, base_url = %format!("http://{bind}/v1"), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shut down");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("agproxy=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "ctrl-c handler failed");
    }
}
