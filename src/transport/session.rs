//! WebSocket session
//!
//! A single persistent connection to the server under test. The async side
//! (resolve, connect, handshake, frame I/O) runs in a [`SessionWorker`] on its
//! own thread and runtime; callers talk to it through the blocking
//! [`WebSocketSession`] handle.
//!
//! ```text
//! Disconnected -> Resolving -> Connecting -> Handshaking -> Connected
//!                                                              |
//!                                  Closed <- Closing <---------+
//! ```
//!
//! Any failure before `Connected` moves straight to `Closed`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Condvar, Mutex};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, USER_AGENT};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use url::Url;

use crate::common::{Error, Result};

/// User agent sent with the WebSocket upgrade request
const CLIENT_USER_AGENT: &str = "rpcflow";

/// Address of the server under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: "/".to_string(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// `ws://host:port/path`
    pub fn url(&self) -> Result<Url> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        Url::parse(&format!("ws://{}:{}{}", self.host, self.port, path))
            .map_err(|e| Error::Config(format!("Invalid server endpoint: {e}")))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Resolving,
    Connecting,
    Handshaking,
    Connected,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether the connect phase is over, successfully or not
    fn is_settled(self) -> bool {
        matches!(self, Self::Connected | Self::Closing | Self::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Resolving => write!(f, "resolving"),
            Self::Connecting => write!(f, "connecting"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::Connected => write!(f, "connected"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// State shared between the handle and its worker
struct Shared {
    state: Mutex<SessionState>,
    changed: Condvar,
}

impl Shared {
    fn set(&self, id: usize, state: SessionState) {
        let mut current = self.state.lock();
        tracing::trace!(session = id, from = %*current, to = %state, "Session state change");
        *current = state;
        self.changed.notify_all();
    }
}

enum SessionCommand {
    Write {
        data: String,
        done: oneshot::Sender<Result<()>>,
    },
    Close,
}

/// Blocking handle to one WebSocket connection
pub struct WebSocketSession {
    id: usize,
    endpoint: Endpoint,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    incoming: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl WebSocketSession {
    /// Create a session and the worker that will connect and drive it
    ///
    /// Nothing happens on the network until [`SessionWorker::run`] is called.
    pub fn open(id: usize, endpoint: Endpoint, connect_timeout: Duration) -> (Self, SessionWorker) {
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Disconnected),
            changed: Condvar::new(),
        });
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let worker = SessionWorker {
            id,
            endpoint: endpoint.clone(),
            connect_timeout,
            shared: Arc::clone(&shared),
            commands: command_rx,
            incoming: incoming_tx,
        };

        let session = Self {
            id,
            endpoint,
            shared,
            commands: command_tx,
            incoming: Mutex::new(incoming_rx),
        };

        (session, worker)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    /// Block until the handshake completed
    ///
    /// Fails with [`Error::ConnectionClosed`] when the session closed instead,
    /// e.g. because the server could not be reached.
    pub fn ensure_connected(&self) -> Result<()> {
        match self.wait_settled() {
            SessionState::Connected => Ok(()),
            _ => Err(Error::ConnectionClosed),
        }
    }

    /// Send one text frame, blocking until it has been flushed
    pub fn write(&self, data: String) -> Result<()> {
        self.ensure_connected()?;

        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Write {
                data,
                done: done_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        done_rx.blocking_recv().map_err(|_| Error::ConnectionClosed)?
    }

    /// Block until the next text frame arrives
    ///
    /// Frames received before the connection closed are still delivered.
    pub fn read_one(&self) -> Result<String> {
        self.wait_settled();
        self.incoming
            .lock()
            .blocking_recv()
            .ok_or(Error::ConnectionClosed)
    }

    /// Ask the worker to close the connection; does not wait
    pub fn close(&self) {
        let _ = self.commands.send(SessionCommand::Close);
    }

    fn wait_settled(&self) -> SessionState {
        let mut state = self.shared.state.lock();
        while !state.is_settled() {
            self.shared.changed.wait(&mut state);
        }
        *state
    }
}

/// Async half of a session, run to completion on a dedicated thread
pub struct SessionWorker {
    id: usize,
    endpoint: Endpoint,
    connect_timeout: Duration,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    incoming: mpsc::UnboundedSender<String>,
}

impl SessionWorker {
    /// Run the session reactor until the connection is closed
    pub fn run(self) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(session = self.id, "Failed to build session runtime: {}", e);
                self.shared.set(self.id, SessionState::Closed);
                return;
            }
        };

        runtime.block_on(self.drive());
    }

    async fn drive(self) {
        let SessionWorker {
            id,
            endpoint,
            connect_timeout,
            shared,
            mut commands,
            incoming,
        } = self;

        let established = tokio::select! {
            result = establish(id, &endpoint, connect_timeout, &shared) => Some(result),
            _ = commands.recv() => None,
        };

        let ws = match established {
            Some(Ok(ws)) => ws,
            Some(Err(e)) => {
                tracing::warn!(session = id, endpoint = %endpoint, "Session failed to connect: {}", e);
                shared.set(id, SessionState::Closed);
                return;
            }
            None => {
                tracing::debug!(session = id, "Session closed before it connected");
                shared.set(id, SessionState::Closed);
                return;
            }
        };

        shared.set(id, SessionState::Connected);
        tracing::debug!(session = id, endpoint = %endpoint, "Session connected");

        let (mut ws_write, mut ws_read) = ws.split();

        loop {
            tokio::select! {
                frame = ws_read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            tracing::trace!(session = id, "<<< {}", text.as_str());
                            let _ = incoming.send(text.as_str().to_owned());
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            let _ = incoming.send(String::from_utf8_lossy(&bytes).into_owned());
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::debug!(session = id, "Connection closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(session = id, "WebSocket error: {}", e);
                            break;
                        }
                        // Ping/Pong are answered by tungstenite
                        Some(Ok(_)) => {}
                    }
                }

                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Write { data, done }) => {
                            tracing::trace!(session = id, ">>> {}", data);
                            let result = ws_write
                                .send(Message::Text(data.into()))
                                .await
                                .map_err(|e| Error::Connection(format!("Write failed: {e}")));
                            let _ = done.send(result);
                        }
                        Some(SessionCommand::Close) | None => {
                            shared.set(id, SessionState::Closing);
                            if let Err(e) = ws_write.close().await {
                                tracing::debug!(session = id, "Close handshake failed: {}", e);
                            }
                            break;
                        }
                    }
                }
            }
        }

        shared.set(id, SessionState::Closed);
        tracing::debug!(session = id, "Session worker finished");
    }
}

/// Resolve, connect and perform the WebSocket handshake
async fn establish(
    id: usize,
    endpoint: &Endpoint,
    connect_timeout: Duration,
    shared: &Shared,
) -> Result<WebSocketStream<TcpStream>> {
    let url = endpoint.url()?;

    shared.set(id, SessionState::Resolving);
    let addr = timeout(
        connect_timeout,
        tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port)),
    )
    .await
    .map_err(|_| Error::Connection(format!("Resolving {endpoint} timed out")))??
    .next()
    .ok_or_else(|| Error::Connection(format!("No address found for {endpoint}")))?;

    shared.set(id, SessionState::Connecting);
    let stream = timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Connection(format!("Connecting to {addr} timed out")))??;

    shared.set(id, SessionState::Handshaking);
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::Connection(format!("Invalid handshake request: {e}")))?;
    request
        .headers_mut()
        .insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    let (ws, _response) = timeout(connect_timeout, tokio_tungstenite::client_async(request, stream))
        .await
        .map_err(|_| Error::Connection(format!("Handshake with {endpoint} timed out")))?
        .map_err(|e| Error::Connection(format!("Handshake failed: {e}")))?;

    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_endpoint_url() {
        let endpoint = Endpoint::new("127.0.0.1", 51233);
        assert_eq!(endpoint.url().unwrap().as_str(), "ws://127.0.0.1:51233/");

        let endpoint = Endpoint::new("localhost", 6006).with_path("rpc");
        assert_eq!(endpoint.url().unwrap().as_str(), "ws://localhost:6006/rpc");
        assert_eq!(endpoint.to_string(), "localhost:6006");
    }

    #[test]
    fn test_new_session_is_disconnected() {
        let (session, _worker) = WebSocketSession::open(
            0,
            Endpoint::new("127.0.0.1", 1),
            Duration::from_secs(1),
        );
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_unreachable_server_closes_softly() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let (session, worker) = WebSocketSession::open(
            7,
            Endpoint::new("127.0.0.1", port),
            Duration::from_secs(2),
        );
        let handle = std::thread::spawn(move || worker.run());

        assert!(matches!(session.ensure_connected(), Err(Error::ConnectionClosed)));
        assert!(matches!(session.write("{}".into()), Err(Error::ConnectionClosed)));
        assert!(matches!(session.read_one(), Err(Error::ConnectionClosed)));
        assert_eq!(session.state(), SessionState::Closed);

        handle.join().unwrap();
    }
}
