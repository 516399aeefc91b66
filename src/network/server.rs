//! WebSocket Game Server
//!
//! Accepts WebSocket connections and bridges each one to the reactor: a
//! reader task forwards text frames as events, a writer task drains the
//! connection's outbound channel into the socket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::network::protocol::ServerMessage;
use crate::network::reactor::{Reactor, ReactorConfig, ReactorEvent, ReactorHandle, ReactorStats};
use crate::network::session::SessionConfig;
use crate::store::ResultSink;

/// How long a connection keeps flushing queued messages after shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(2);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    /// Session timing.
    pub session: SessionConfig,
    /// How long a lone queued player waits for a human opponent.
    pub bot_fallback_delay: Duration,
    /// JSON-lines results file; in-memory when unset.
    pub results_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_connections: 1000,
            outbound_buffer: 256,
            session: SessionConfig::default(),
            bot_fallback_delay: Duration::from_secs(5),
            results_path: None,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.bind_addr = parsed;
            } else {
                warn!("Invalid BIND_ADDR '{}', using default", addr);
            }
        }

        if let Ok(max) = std::env::var("MAX_CONNECTIONS") {
            match max.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.max_connections = parsed,
                _ => warn!("Invalid MAX_CONNECTIONS '{}', using default", max),
            }
        }

        if let Ok(rate) = std::env::var("TICK_RATE") {
            match rate.parse::<u32>() {
                Ok(parsed) if (1..=1000).contains(&parsed) => config.session.tick_rate = parsed,
                _ => warn!("TICK_RATE must be 1-1000, got '{}', using default", rate),
            }
        }

        if let Ok(ms) = std::env::var("BROADCAST_INTERVAL_MS") {
            if let Ok(parsed) = ms.parse::<u64>() {
                config.session.broadcast_interval = Duration::from_millis(parsed);
            } else {
                warn!("Invalid BROADCAST_INTERVAL_MS '{}', using default", ms);
            }
        }

        if let Ok(ticks) = std::env::var("SERVE_DELAY_TICKS") {
            if let Ok(parsed) = ticks.parse::<u32>() {
                config.session.serve_delay_ticks = parsed;
            } else {
                warn!("Invalid SERVE_DELAY_TICKS '{}', using default", ticks);
            }
        }

        if let Ok(ms) = std::env::var("BOT_FALLBACK_MS") {
            if let Ok(parsed) = ms.parse::<u64>() {
                config.bot_fallback_delay = Duration::from_millis(parsed);
            } else {
                warn!("Invalid BOT_FALLBACK_MS '{}', using default", ms);
            }
        }

        if let Ok(len) = std::env::var("OUTBOUND_BUFFER") {
            match len.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.outbound_buffer = parsed,
                _ => warn!("Invalid OUTBOUND_BUFFER '{}', using default", len),
            }
        }

        if let Ok(path) = std::env::var("RESULTS_PATH") {
            if !path.is_empty() {
                config.results_path = Some(PathBuf::from(path));
            }
        }

        config
    }

    /// Settings handed to the reactor.
    pub fn reactor_config(&self) -> ReactorConfig {
        ReactorConfig {
            session: self.session.clone(),
            bot_fallback_delay: self.bot_fallback_delay,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// `run` called twice.
    #[error("Server already running")]
    AlreadyRunning,
}

type Unstarted = (Reactor, mpsc::UnboundedReceiver<ReactorEvent>);

/// The game server.
pub struct GameServer {
    config: ServerConfig,
    handle: ReactorHandle,
    /// Reactor until `serve` takes it.
    reactor: Mutex<Option<Unstarted>>,
    connections: Arc<AtomicUsize>,
    stopping: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server writing results to `sink`.
    pub fn new(config: ServerConfig, sink: Arc<dyn ResultSink>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (reactor, events) = Reactor::new(config.reactor_config(), sink);
        let handle = reactor.handle();

        Self {
            config,
            handle,
            reactor: Mutex::new(Some((reactor, events))),
            connections: Arc::new(AtomicUsize::new(0)),
            stopping: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let (reactor, events) = self
            .reactor
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or(GameServerError::AlreadyRunning)?;

        info!("Game server listening on {}", listener.local_addr()?);
        let reactor_shutdown = self.shutdown_tx.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.stopping.load(Ordering::SeqCst) {
            // shutdown() ran before these receivers existed
            let _ = self.shutdown_tx.send(());
        }
        let reactor_task = tokio::spawn(reactor.run(events, reactor_shutdown));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        if let Err(e) = reactor_task.await {
            error!("Reactor task failed: {}", e);
        }
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let handle = self.handle.clone();
        let connections = self.connections.clone();
        let buffer = self.config.outbound_buffer;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    connections.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };

            let conn = Uuid::new_v4();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(buffer);
            handle.connected(conn, msg_tx);
            debug!(%conn, %addr, "Client connected");

            // Ends once the reactor drops every sender for this connection
            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let shutting_down = loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if !handle.inbound(conn, text) {
                                    break false;
                                }
                            }
                            Some(Ok(Message::Binary(data))) => {
                                debug!(%conn, len = data.len(), "Ignoring binary frame");
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break false;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break false;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break true;
                    }
                }
            };

            if shutting_down {
                // The reactor finishes live sessions on the way out; flush
                // their gameEnd before closing the socket.
                if tokio::time::timeout(SHUTDOWN_DRAIN, &mut sender_task).await.is_err() {
                    debug!(%conn, "Outbound drain timed out");
                    sender_task.abort();
                }
            } else {
                handle.closed(conn);
                sender_task.abort();
            }
            connections.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Reactor handle, for status queries.
    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    /// Open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Reactor counters, read directly if the reactor has not started.
    pub async fn stats(&self) -> ReactorStats {
        let unstarted = self
            .reactor
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|(reactor, _)| reactor.stats()));
        match unstarted {
            Some(stats) => stats,
            None => self.handle.stats().await.unwrap_or_default(),
        }
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.stats().await.sessions
    }

    /// Get matchmaking queue size.
    pub async fn queue_size(&self) -> usize {
        self.stats().await.queue_size
    }
}
