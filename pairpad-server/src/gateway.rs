//! WebSocket gateway: one listener, two channels.
//!
//! ```text
//! ws://host/<roomKey>  ── binary frames ──► DocumentHub
//! ws://host/exec       ── JSON text    ──► ExecutionManager
//! ```
//!
//! The route is decided during the handshake. Malformed or unknown room
//! keys are refused there, before any state exists.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use pairpad_collab::{outbox, DocumentHub, YrsEngine};
use pairpad_core::{ConnectionId, RoomKey, ValidationError};
use pairpad_exec::{ExecError, ExecEvent, ExecRequest, ExecutionManager, Viewer};

use crate::config::ServerConfig;
use crate::registry::{OpenRegistry, RoomRegistry};

/// Path segment of the execution channel.
pub const EXEC_PATH: &str = "exec";

/// Gateway errors. Request-level variants are reported to the client as
/// `error` events; transport variants end the connection.
#[derive(Debug)]
pub enum GatewayError {
    Io(std::io::Error),
    WebSocket(tungstenite::Error),
    Validation(ValidationError),
    RoomNotAdmitted(String),
    InvalidRequest(String),
    Exec(ExecError),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::WebSocket(e) => write!(f, "WebSocket error: {e}"),
            Self::Validation(e) => write!(f, "{e}"),
            Self::RoomNotAdmitted(_) => write!(f, "Unknown room"),
            Self::InvalidRequest(_) => write!(f, "Invalid request"),
            Self::Exec(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Io(e)
    }
}

impl From<tungstenite::Error> for GatewayError {
    fn from(e: tungstenite::Error) -> Self {
        GatewayError::WebSocket(e)
    }
}

impl From<ValidationError> for GatewayError {
    fn from(e: ValidationError) -> Self {
        GatewayError::Validation(e)
    }
}

impl From<ExecError> for GatewayError {
    fn from(e: ExecError) -> Self {
        GatewayError::Exec(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Sync(RoomKey),
    Exec,
}

fn route(path: &str, registry: &dyn RoomRegistry) -> Result<Route, GatewayError> {
    let segment = path.trim_matches('/');
    if segment == EXEC_PATH {
        return Ok(Route::Exec);
    }
    let room = RoomKey::parse(segment)?;
    if !registry.admits(&room) {
        return Err(GatewayError::RoomNotAdmitted(room.to_string()));
    }
    Ok(Route::Sync(room))
}

fn reject(err: &GatewayError) -> ErrorResponse {
    let status = match err {
        GatewayError::RoomNotAdmitted(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_REQUEST,
    };
    let mut response = ErrorResponse::new(Some(err.to_string()));
    *response.status_mut() = status;
    response
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Accepts connections and routes them to the hub or the exec manager.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<ServerConfig>,
    registry: Arc<dyn RoomRegistry>,
    hub: Arc<DocumentHub<YrsEngine>>,
    exec: ExecutionManager,
}

impl Gateway {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, OpenRegistry)
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    pub fn with_registry(config: ServerConfig, registry: impl RoomRegistry) -> Self {
        let hub = DocumentHub::new(YrsEngine::new(), config.hub.clone());
        let exec = ExecutionManager::new(config.exec.clone());
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            hub: Arc::new(hub),
            exec,
        }
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn hub(&self) -> &Arc<DocumentHub<YrsEngine>> {
        &self.hub
    }

    pub fn exec(&self) -> &ExecutionManager {
        &self.exec
    }

    /// Bind the configured address and serve until the future is dropped.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        log::info!("Gateway listening on {}", listener.local_addr()?);
        let _sweeper = AbortOnDrop(self.spawn_presence_sweeper());

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::warn!("TCP accept error: {e}");
                    continue;
                }
            };
            log::debug!("New TCP connection from {addr}");

            let gateway = self.clone();
            tokio::spawn(async move {
                if let Err(e) = gateway.handle_connection(stream, addr).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Kill every run and remove every work dir.
    pub async fn shutdown(&self) {
        self.exec.shutdown().await;
        log::info!("Gateway shut down");
    }

    fn spawn_presence_sweeper(&self) -> JoinHandle<()> {
        let hub = self.hub.clone();
        let period = self.config.presence_sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let swept = hub.prune_outdated().await;
                if swept > 0 {
                    log::debug!("Swept {swept} outdated presence state(s)");
                }
            }
        })
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), GatewayError> {
        let registry = self.registry.clone();
        let chosen = Arc::new(std::sync::Mutex::new(None));
        let slot = chosen.clone();

        let ws = accept_hdr_async(stream, move |req: &Request, resp: Response| {
            match route(req.uri().path(), registry.as_ref()) {
                Ok(route) => {
                    if let Ok(mut guard) = slot.lock() {
                        *guard = Some(route);
                    }
                    Ok(resp)
                }
                Err(e) => {
                    log::warn!("Refused {} from {addr}: {e}", req.uri().path());
                    Err(reject(&e))
                }
            }
        })
        .await?;

        let route = chosen.lock().ok().and_then(|mut guard| guard.take());
        match route {
            Some(Route::Sync(room)) => self.handle_sync(ws, addr, room).await,
            Some(Route::Exec) => self.handle_exec(ws, addr).await,
            None => Ok(()),
        }
    }

    async fn handle_sync(
        &self,
        ws: WebSocketStream<TcpStream>,
        addr: SocketAddr,
        room: RoomKey,
    ) -> Result<(), GatewayError> {
        let id = ConnectionId::new();
        let (tx, mut outgoing) = outbox();
        self.hub.join(id, room.as_str(), tx).await?;
        log::info!("Sync connection {id} from {addr} joined room {room}");

        let (mut sink, mut stream) = ws.split();
        let result = async {
            loop {
                tokio::select! {
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Binary(data))) => {
                            // Dropped frames are logged by the hub
                            let _ = self.hub.on_message(id, &data).await;
                        }
                        Some(Ok(Message::Text(text))) => {
                            if text.as_str() == "ping" {
                                sink.send(Message::Text("pong".into())).await?;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            sink.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }
                        Some(Ok(_)) => {}
                    },
                    Some(payload) = outgoing.recv() => {
                        sink.send(Message::Binary(payload.to_vec().into())).await?;
                    }
                }
            }
            Ok::<(), GatewayError>(())
        }
        .await;

        self.hub.leave(id).await;
        log::info!("Sync connection {id} left room {room}");
        result
    }

    async fn handle_exec(
        &self,
        ws: WebSocketStream<TcpStream>,
        addr: SocketAddr,
    ) -> Result<(), GatewayError> {
        let id = ConnectionId::new();
        let (viewer, mut events) = mpsc::unbounded_channel::<ExecEvent>();
        log::info!("Exec connection {id} from {addr}");

        let (mut sink, mut stream) = ws.split();
        let result = async {
            loop {
                tokio::select! {
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.dispatch_exec(id, text.as_str(), &viewer).await;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            let err = GatewayError::InvalidRequest("binary frame".into());
                            let _ = viewer.send(ExecEvent::error(&err));
                        }
                        Some(Ok(Message::Ping(data))) => {
                            sink.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }
                        Some(Ok(_)) => {}
                    },
                    Some(event) = events.recv() => {
                        sink.send(Message::Text(event.to_json().into())).await?;
                    }
                }
            }
            Ok::<(), GatewayError>(())
        }
        .await;

        self.exec.disconnect(id).await;
        log::info!("Exec connection {id} closed");
        result
    }

    /// Handle one request; failures go back to this connection only.
    ///
    /// A run is submitted here, which fixes its order, and started on its
    /// own task so this connection keeps receiving events meanwhile.
    async fn dispatch_exec(&self, id: ConnectionId, text: &str, viewer: &Viewer) {
        if let Err(e) = self.exec_request(id, text, viewer).await {
            log::debug!("Exec request from {id} failed: {e:?}");
            let _ = viewer.send(ExecEvent::error(&e));
        }
    }

    async fn exec_request(
        &self,
        id: ConnectionId,
        text: &str,
        viewer: &Viewer,
    ) -> Result<(), GatewayError> {
        let request: ExecRequest = serde_json::from_str(text)
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        match request {
            ExecRequest::Join { room_key, size } => {
                self.admit(&room_key)?;
                self.exec.join(id, &room_key, size, viewer.clone()).await?;
            }
            ExecRequest::Leave { room_key } => {
                self.exec.leave(id, &room_key).await?;
            }
            ExecRequest::Run {
                room_key,
                language,
                code,
            } => {
                self.admit(&room_key)?;
                let pending = self.exec.submit(id, &room_key, &language, &code)?;
                let viewer = viewer.clone();
                tokio::spawn(async move {
                    if let Err(e) = pending.start().await {
                        log::debug!("Run requested by {id} failed: {e}");
                        let _ = viewer.send(ExecEvent::error(&e));
                    }
                });
            }
            ExecRequest::Resize { room_key, size } => {
                self.exec.resize(id, &room_key, size).await?;
            }
        }
        Ok(())
    }

    fn admit(&self, room_key: &str) -> Result<RoomKey, GatewayError> {
        let room = RoomKey::parse(room_key)?;
        if self.registry.admits(&room) {
            Ok(room)
        } else {
            Err(GatewayError::RoomNotAdmitted(room.to_string()))
        }
    }
}
