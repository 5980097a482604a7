//! WebSocket Game Server
//!
//! Async WebSocket front end. Each connection gets a hub channel, a sender
//! task that writes JSON text frames and a reader loop that feeds decoded
//! events to the session router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::network::players::PlayerRegistry;
use crate::network::protocol::{ClientMessage, ServerMessage, ServerError, ErrorCode};
use crate::network::router::{DisconnectPolicy, RouterConfig, SessionRouter};
use crate::network::transport::{ConnectionId, Hub, Transport};

/// How long a closing connection may spend flushing queued frames.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest a single frame write may take before the socket is given up.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound frames buffered per connection.
    pub outbound_buffer: usize,
    /// What a disconnect does to a running match.
    pub disconnect_policy: DisconnectPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_connections: 1000,
            outbound_buffer: 64,
            disconnect_policy: DisconnectPolicy::Continue,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads `BIND_ADDR`, `MAX_CONNECTIONS`, `OUTBOUND_BUFFER` and
    /// `DISCONNECT_POLICY`; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, GameServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GameServerError> {
        let mut config = Self::default();

        if let Some(value) = lookup("BIND_ADDR") {
            config.bind_addr = parse_setting("BIND_ADDR", &value)?;
        }
        if let Some(value) = lookup("MAX_CONNECTIONS") {
            config.max_connections = parse_setting("MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = lookup("OUTBOUND_BUFFER") {
            let buffer: usize = parse_setting("OUTBOUND_BUFFER", &value)?;
            if buffer == 0 {
                return Err(GameServerError::InvalidConfig { key: "OUTBOUND_BUFFER", value });
            }
            config.outbound_buffer = buffer;
        }
        if let Some(value) = lookup("DISCONNECT_POLICY") {
            config.disconnect_policy = parse_setting("DISCONNECT_POLICY", &value)?;
        }

        Ok(config)
    }
}

fn parse_setting<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, GameServerError> {
    value.trim().parse().map_err(|_| GameServerError::InvalidConfig {
        key,
        value: value.to_string(),
    })
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Bad configuration value.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidConfig {
        /// Environment variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Connection registry and rooms.
    hub: Arc<Hub>,
    /// Event router.
    router: Arc<SessionRouter>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let hub = Arc::new(Hub::new(config.outbound_buffer));
        let router = Arc::new(SessionRouter::new(
            RouterConfig { disconnect_policy: config.disconnect_policy },
            Arc::new(PlayerRegistry::new()),
            hub.clone(),
        ));

        Self {
            config,
            hub,
            router,
            shutdown_tx,
        }
    }

    /// Bind the configured address and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.hub.connection_count().await;
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                tokio::spawn(reject_overloaded(stream, addr));
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

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let hub = self.hub.clone();
        let router = self.router.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let conn = ConnectionId::generate();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let mut msg_rx = hub.register(conn.clone()).await;
            info!(connection = %conn, %addr, "client connected");

            // Runs until the hub drops this connection's sender.
            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    match tokio::time::timeout(WRITE_TIMEOUT, ws_sender.send(Message::Text(text))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) | Err(_) => break,
                    }
                }
                let _ = tokio::time::timeout(WRITE_TIMEOUT, ws_sender.close()).await;
            });

            let mut sender_done = false;
            loop {
                tokio::select! {
                    _ = &mut sender_task => {
                        // Evicted by the hub or the socket stopped accepting writes.
                        debug!(connection = %conn, "outbound side closed");
                        sender_done = true;
                        break;
                    }
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => router.handle(&conn, client_msg).await,
                                    Err(e) => {
                                        debug!(connection = %conn, error = %e, "invalid message");
                                        reject_frame(&hub, &conn).await;
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                debug!(connection = %conn, "binary frame rejected");
                                reject_frame(&hub, &conn).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!(connection = %conn, "client closed connection");
                                break;
                            }
                            Some(Err(e)) => {
                                error!(connection = %conn, error = %e, "WebSocket error");
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = hub.send(&conn, ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Leave the hub first so nothing is sent to a dead socket.
            hub.unregister(&conn).await;
            if let Err(e) = router.on_disconnect(&conn).await {
                error!(connection = %conn, error = %e, "disconnect handling failed");
            }

            if !sender_done && tokio::time::timeout(FLUSH_TIMEOUT, sender_task).await.is_err() {
                debug!(connection = %conn, "sender did not flush in time");
            }

            info!(connection = %conn, %addr, "client cleaned up");
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.hub.connection_count().await
    }

    /// Get running match count.
    pub async fn active_match_count(&self) -> usize {
        self.router.active_match_count().await
    }

    /// Get matchmaking queue size.
    pub async fn queue_size(&self) -> usize {
        self.router.queue_size().await
    }
}

/// Complete the handshake only to report that the server is full.
async fn reject_overloaded(stream: TcpStream, addr: SocketAddr) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Handshake with rejected client {} failed: {}", addr, e);
            return;
        }
    };

    let reply = ServerMessage::Error(ServerError::new(
        ErrorCode::ServerOverloaded,
        "Server is at its connection limit",
    ));
    if let Ok(text) = reply.to_json() {
        let _ = tokio::time::timeout(WRITE_TIMEOUT, ws.send(Message::Text(text))).await;
    }
    let _ = tokio::time::timeout(WRITE_TIMEOUT, ws.close(None)).await;
}

async fn reject_frame(hub: &Hub, conn: &ConnectionId) {
    let reply = ServerMessage::Error(ServerError::new(
        ErrorCode::InvalidMessage,
        "Invalid message format",
    ));
    if let Err(e) = hub.send(conn, reply).await {
        debug!(connection = %conn, error = %e, "could not report invalid message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_server() -> (Arc<GameServer>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(GameServer::new(ServerConfig {
            bind_addr: addr,
            ..Default::default()
        }));

        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });
        (server, addr)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws
    }

    async fn send(ws: &mut Client, msg: &ClientMessage) {
        ws.send(Message::Text(msg.to_json().unwrap())).await.unwrap();
    }

    async fn recv(ws: &mut Client) -> ServerMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(text) = frame {
                return ServerMessage::from_json(&text).unwrap();
            }
        }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.outbound_buffer, 64);
        assert_eq!(config.disconnect_policy, DisconnectPolicy::Continue);
    }

    #[test]
    fn test_server_config_from_lookup() {
        let vars: BTreeMap<&str, &str> = [
            ("BIND_ADDR", "127.0.0.1:4000"),
            ("MAX_CONNECTIONS", "10"),
            ("DISCONNECT_POLICY", "forfeit"),
        ].into_iter().collect();

        let config = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:4000".parse().unwrap());
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.outbound_buffer, 64);
        assert_eq!(config.disconnect_policy, DisconnectPolicy::Forfeit);
    }

    #[test]
    fn test_server_config_rejects_bad_values() {
        let err = ServerConfig::from_lookup(|k| (k == "MAX_CONNECTIONS").then(|| "lots".to_string()));
        assert!(matches!(err, Err(GameServerError::InvalidConfig { key: "MAX_CONNECTIONS", .. })));

        let err = ServerConfig::from_lookup(|k| (k == "OUTBOUND_BUFFER").then(|| "0".to_string()));
        assert!(matches!(err, Err(GameServerError::InvalidConfig { key: "OUTBOUND_BUFFER", .. })));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = GameServer::new(config);

        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.active_match_count().await, 0);
        assert_eq!(server.queue_size().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = GameServer::new(ServerConfig::default());
        server.shutdown();
        // Should not panic
    }

    #[tokio::test]
    async fn test_websocket_pairing() {
        let (server, addr) = start_server().await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;

        send(&mut alice, &ClientMessage::Login { identity: "alice".into() }).await;
        assert!(matches!(recv(&mut alice).await, ServerMessage::Profile(p) if p.identity == "alice"));
        send(&mut bob, &ClientMessage::Login { identity: "bob".into() }).await;
        assert!(matches!(recv(&mut bob).await, ServerMessage::Profile(p) if p.rating == 1000));

        send(&mut alice, &ClientMessage::JoinQueue).await;
        send(&mut bob, &ClientMessage::JoinQueue).await;

        let a = recv(&mut alice).await;
        let b = recv(&mut bob).await;
        match (a, b) {
            (ServerMessage::MatchFound { color: ca }, ServerMessage::MatchFound { color: cb }) => {
                assert_eq!(ca.opponent(), cb);
            }
            other => panic!("expected match_found for both, got {:?}", other),
        }
        assert!(matches!(recv(&mut alice).await, ServerMessage::GameUpdate(s) if s.board.piece_count() == 0));
        assert_eq!(server.active_match_count().await, 1);
    }

    #[tokio::test]
    async fn test_connection_limit_reports_overload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(GameServer::new(ServerConfig {
            bind_addr: addr,
            max_connections: 1,
            ..Default::default()
        }));
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });

        let mut first = connect(addr).await;
        send(&mut first, &ClientMessage::Ping { timestamp: 1 }).await;
        recv(&mut first).await;

        let mut second = connect(addr).await;
        assert!(matches!(
            recv(&mut second).await,
            ServerMessage::Error(ServerError { code: ErrorCode::ServerOverloaded, .. })
        ));
        assert_eq!(server.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_frame_gets_error() {
        let (_server, addr) = start_server().await;
        let mut ws = connect(addr).await;

        ws.send(Message::Text("{\"type\":\"teleport\"}".to_string())).await.unwrap();
        assert!(matches!(
            recv(&mut ws).await,
            ServerMessage::Error(ServerError { code: ErrorCode::InvalidMessage, .. })
        ));

        // The connection stays usable.
        send(&mut ws, &ClientMessage::Ping { timestamp: 7 }).await;
        assert!(matches!(recv(&mut ws).await, ServerMessage::Pong { timestamp: 7, .. }));
    }

    #[tokio::test]
    async fn test_shutdown_notifies_clients() {
        let (server, addr) = start_server().await;
        let mut ws = connect(addr).await;

        // Wait until the connection is registered.
        send(&mut ws, &ClientMessage::Ping { timestamp: 1 }).await;
        recv(&mut ws).await;

        server.shutdown();
        assert!(matches!(recv(&mut ws).await, ServerMessage::Shutdown { .. }));
    }
}
