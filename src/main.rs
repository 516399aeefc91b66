//! Pong Arena Server
//!
//! Reads configuration from the environment, opens the result sink and
//! serves WebSocket clients until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pong_arena::{GameServer, JsonlResultSink, MemoryResultSink, ResultSink, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    info!("Pong Arena Server v{}", VERSION);
    info!("Tick Rate: {} Hz", config.session.tick_rate);

    let sink: Arc<dyn ResultSink> = match &config.results_path {
        Some(path) => Arc::new(
            JsonlResultSink::open(path)
                .with_context(|| format!("opening results file {}", path.display()))?,
        ),
        None => {
            info!("RESULTS_PATH not set, keeping match results in memory");
            Arc::new(MemoryResultSink::new())
        }
    };

    let server = Arc::new(GameServer::new(config, sink));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await.context("game server failed")?;
    info!("Server stopped");
    Ok(())
}
