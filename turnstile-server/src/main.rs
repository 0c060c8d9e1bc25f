//! # Turnstile Server
//!
//! Account registration and authentication over HTTP. See the library
//! crate for the route table; configuration is read from the environment
//! (and a `.env` file when present).

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use turnstile_server::{
    infra::{config::Config, logging, startup},
    routes,
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "turnstile-server")]
#[command(about = "Account registration and authentication service")]
struct ServeArgs {
    /// Server port (overrides USERS_SRV_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides USERS_HOST)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServeArgs::parse();

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    logging::init_tracing(config.log_format);

    if config.env_file_loaded {
        info!("loaded .env file");
    }

    let state = startup::build_state(&config).await?;
    let app = routes::create_app(state);

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting Turnstile account service on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}
