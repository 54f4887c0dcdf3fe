use anyhow::Result;
use clap::Parser;
use relay_server::config::{Args, ServerConfig};
use relay_server::{AppState, router};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = ServerConfig::from_args(args)?;

    info!("Relay server running");
    info!("  Port: {}", config.port);
    info!("  Hostname: {}", config.hostname);
    info!("  Secrets: {} configured", config.secrets.len());

    let state = AppState::new(config);
    let port = state.config.port;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await?;

    Ok(())
}
