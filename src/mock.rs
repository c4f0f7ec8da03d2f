//! Mock JSON-RPC server
//!
//! A small WebSocket server answering JSON-RPC 2.0 style requests, used by
//! the integration tests and the `rpcflow-mock-server` binary.
//!
//! Methods:
//! - `echo`: returns `params`
//! - `ping`: returns `{}`
//! - `server_info`: returns static server details
//! - `counter`: returns a server-wide counter, incremented on every call
//!
//! Anything else gets a `-32601` error. The request `id` is always echoed.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

use crate::common::{Error, Result};
use crate::transport::Endpoint;

/// Server-wide counters
#[derive(Debug, Default)]
pub struct MockState {
    counter: AtomicU64,
    connections: AtomicUsize,
    requests: AtomicUsize,
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// WebSocket connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Requests answered so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Answer one request frame
    pub fn handle(&self, text: &str) -> String {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let request: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return error_reply(Value::Null, -32700, &format!("Parse error: {e}")),
        };

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();

        let result = match method {
            "echo" => request.get("params").cloned().unwrap_or(Value::Null),
            "ping" => json!({}),
            "server_info" => json!({
                "info": {
                    "build_version": env!("CARGO_PKG_VERSION"),
                    "server_state": "full",
                    "peers": 0,
                }
            }),
            "counter" => {
                let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                json!({ "count": count })
            }
            other => return error_reply(id, -32601, &format!("Method '{other}' not found")),
        };

        json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
    }
}

fn error_reply(id: Value, code: i64, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message},
    })
    .to_string()
}

/// Accept connections on `listener` until `shutdown` resolves
pub async fn serve(listener: TcpListener, state: Arc<MockState>, shutdown: impl Future<Output = ()>) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!(?addr, "Mock server accepted connection");
                        tokio::spawn(handle_connection(stream, Arc::clone(&state)));
                    }
                    Err(e) => tracing::warn!("Mock server accept failed: {}", e),
                }
            }
            _ = &mut shutdown => {
                tracing::debug!("Mock server shutting down");
                break;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<MockState>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!("WebSocket upgrade failed: {}", e);
            return;
        }
    };
    state.connections.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws.split();
    while let Some(frame) = read.next().await {
        let reply = match frame {
            Ok(Message::Text(text)) => state.handle(text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("Mock connection error: {}", e);
                break;
            }
        };

        if let Err(e) = write.send(Message::Text(reply.into())).await {
            tracing::debug!("Mock reply failed: {}", e);
            break;
        }
    }
}

/// Mock server running on its own thread, stopped on drop
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Start on an OS-assigned localhost port
    pub fn start() -> Result<Self> {
        Self::start_on(SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    pub fn start_on(addr: SocketAddr) -> Result<Self> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let state = Arc::new(MockState::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build mock server runtime: {e}")))?;

        let server_state = Arc::clone(&state);
        let thread = std::thread::Builder::new()
            .name("rpcflow-mock-server".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(e) => {
                            tracing::error!("Mock server listener setup failed: {}", e);
                            return;
                        }
                    };
                    serve(listener, server_state, async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
                });
            })?;

        tracing::debug!(%addr, "Mock server started");

        Ok(Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub fn state(&self) -> &MockState {
        &self.state
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
