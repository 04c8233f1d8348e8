use crate::connection::ConnectionEvent;
use crate::engine::{Effect, Engine, PresentationSink};
use crate::error::{ViewerError, ViewerResult};
use crate::types::LogLevel;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use std::collections::BTreeSet;
use std::future::{self, Future};
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ConnectFuture = Pin<Box<dyn Future<Output = ViewerResult<WsStream>> + Send>>;

/// Commands that can be sent to a running session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    SetScope(Option<String>),
    SetLevels(BTreeSet<LogLevel>),
    ToggleLevel(LogLevel),
    SetKeyword(String),
    Clear,
    Retry,
    Quit,
}

/// Derives the stream endpoint from a page-style origin: `http` becomes `ws`,
/// `https` becomes `wss`, and the path is `/ws`.
pub fn endpoint_from_origin(origin: &str) -> ViewerResult<Url> {
    let mut url = Url::parse(origin)?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ViewerError::ConfigError(format!(
                "Unsupported server scheme: {}",
                other
            )))
        }
    };

    url.set_scheme(scheme)
        .map_err(|_| ViewerError::ConfigError(format!("Cannot derive {} URL from {}", scheme, origin)))?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

/// Transport state owned by the session loop.
#[derive(Default)]
struct Link {
    pending: Option<ConnectFuture>,
    socket: Option<WsStream>,
    retry_at: Option<Instant>,
}

impl Link {
    async fn execute(&mut self, endpoint: &Url, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Open => {
                    info!("Connecting to {}", endpoint);
                    self.socket = None;
                    self.pending = Some(connect(endpoint));
                }
                Effect::Send(text) => match self.socket.as_mut() {
                    Some(socket) => {
                        trace!("Sending frame: {}", text);
                        if let Err(e) = socket.send(Message::text(text)).await {
                            warn!("Failed to send frame: {}", e);
                        }
                    }
                    None => debug!("No open socket, dropping frame"),
                },
                Effect::ScheduleRetry(delay) => {
                    self.retry_at = Some(Instant::now() + delay);
                }
            }
        }
    }
}

fn connect(endpoint: &Url) -> ConnectFuture {
    let url = endpoint.to_string();
    Box::pin(async move {
        match timeout(CONNECT_TIMEOUT, connect_async(url)).await {
            Ok(Ok((socket, _response))) => Ok(socket),
            Ok(Err(e)) => Err(ViewerError::from(e)),
            Err(_) => Err(ViewerError::Timeout(CONNECT_TIMEOUT)),
        }
    })
}

async fn finish_connect(pending: &mut Option<ConnectFuture>) -> ViewerResult<WsStream> {
    match pending {
        Some(attempt) => attempt.await,
        None => future::pending().await,
    }
}

async fn next_message(
    socket: &mut Option<WsStream>,
) -> Option<Result<Message, tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => future::pending().await,
    }
}

async fn retry_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// Drives an [`Engine`] over a WebSocket connection.
///
/// Everything runs on one task: connect attempts, inbound frames, the
/// reconnect timer and user commands are handled one at a time in arrival
/// order.
pub struct Session<S: PresentationSink> {
    endpoint: Url,
    engine: Engine<S>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl<S: PresentationSink> Session<S> {
    pub fn new(endpoint: Url, engine: Engine<S>, command_rx: mpsc::Receiver<EngineCommand>) -> Self {
        Self {
            endpoint,
            engine,
            command_rx,
        }
    }

    /// Runs until a [`EngineCommand::Quit`] arrives, then hands the engine back.
    pub async fn run(mut self) -> Engine<S> {
        let mut link = Link::default();
        let mut commands_open = true;

        let effects = self.engine.start();
        link.execute(&self.endpoint, effects).await;

        loop {
            tokio::select! {
                result = finish_connect(&mut link.pending) => {
                    link.pending = None;
                    let event = match result {
                        Ok(socket) => {
                            info!("Connected to {}", self.endpoint);
                            link.socket = Some(socket);
                            ConnectionEvent::Opened
                        }
                        Err(e) => {
                            warn!("Connection to {} failed: {}", self.endpoint, e);
                            ConnectionEvent::Closed
                        }
                    };
                    let effects = self.engine.on_connection_event(event);
                    link.execute(&self.endpoint, effects).await;
                }

                message = next_message(&mut link.socket) => {
                    let closed = match message {
                        Some(Ok(Message::Text(text))) => {
                            self.engine.on_frame(text.as_str());
                            false
                        }
                        Some(Ok(Message::Binary(data))) => {
                            warn!("Ignoring binary frame of {} bytes", data.len());
                            false
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("Server closed the connection: {:?}", frame);
                            true
                        }
                        Some(Ok(_)) => false,
                        Some(Err(e)) => {
                            warn!("WebSocket error: {}", e);
                            true
                        }
                        None => {
                            info!("WebSocket stream ended");
                            true
                        }
                    };

                    if closed {
                        link.socket = None;
                        let effects = self.engine.on_connection_event(ConnectionEvent::Closed);
                        link.execute(&self.endpoint, effects).await;
                    }
                }

                () = retry_timer(link.retry_at) => {
                    link.retry_at = None;
                    let effects = self.engine.on_connection_event(ConnectionEvent::RetryElapsed);
                    link.execute(&self.endpoint, effects).await;
                }

                command = self.command_rx.recv(), if commands_open => {
                    match command {
                        Some(EngineCommand::Quit) => {
                            info!("Stopping session");
                            break;
                        }
                        Some(command) => {
                            let effects = self.apply(command);
                            link.execute(&self.endpoint, effects).await;
                        }
                        None => {
                            debug!("Command channel closed, streaming continues");
                            commands_open = false;
                        }
                    }
                }
            }
        }

        if let Some(mut socket) = link.socket.take() {
            if let Err(e) = socket.close(None).await {
                debug!("Error while closing socket: {}", e);
            }
        }

        self.engine
    }

    fn apply(&mut self, command: EngineCommand) -> Vec<Effect> {
        debug!("Applying command: {:?}", command);

        match command {
            EngineCommand::SetScope(scope) => self.engine.set_client_scope(scope),
            EngineCommand::SetLevels(levels) => {
                self.engine.set_levels(levels);
                Vec::new()
            }
            EngineCommand::ToggleLevel(level) => {
                self.engine.toggle_level(level);
                Vec::new()
            }
            EngineCommand::SetKeyword(keyword) => {
                self.engine.set_keyword(keyword);
                Vec::new()
            }
            EngineCommand::Clear => {
                self.engine.clear();
                Vec::new()
            }
            EngineCommand::Retry => self.engine.retry(),
            EngineCommand::Quit => Vec::new(),
        }
    }
}

/// Handle for sending commands to a session
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<EngineCommand>,
}

impl SessionHandle {
    pub fn new(command_tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { command_tx }
    }

    pub async fn send(&self, command: EngineCommand) -> anyhow::Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send session command: {}", e))
    }
}
