//! Connection pool
//!
//! A fixed set of WebSocket sessions, each driven by its own worker thread.
//! Free sessions sit in a [`BlockingQueue`]; borrowing pops one, dropping the
//! returned [`ConnectionLink`] pushes it back. The queue capacity is the hard
//! bound on concurrent exchanges.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use super::queue::BlockingQueue;
use super::session::{Endpoint, WebSocketSession};
use super::{ConnectionSource, Link};
use crate::common::{Error, Result};

/// Default number of pooled sessions
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default connect/handshake timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

struct PoolShared {
    free: BlockingQueue<WebSocketSession>,
    draining: AtomicBool,
}

/// Bounded pool of persistent WebSocket sessions
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    endpoint: Endpoint,
    size: usize,
}

impl ConnectionPool {
    /// Open `size` sessions to `endpoint` and make them available for borrowing
    ///
    /// Sessions connect in the background; connection failures surface on the
    /// first write or read through a borrowed link.
    pub fn connect(endpoint: Endpoint, size: usize, connect_timeout: Duration) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("Pool size must be at least 1".to_string()));
        }

        let shared = Arc::new(PoolShared {
            free: BlockingQueue::with_deleter(size, |session: WebSocketSession| {
                tracing::trace!(session = session.id(), "Closing pooled session");
                session.close();
            }),
            draining: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let (session, worker) = WebSocketSession::open(id, endpoint.clone(), connect_timeout);

            let handle = std::thread::Builder::new()
                .name(format!("rpcflow-session-{id}"))
                .spawn(move || worker.run())?;

            workers.push(handle);
            shared.free.enqueue(session);
        }

        tracing::info!(endpoint = %endpoint, size, "Connection pool started");

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            endpoint,
            size,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of sessions currently free
    pub fn available(&self) -> usize {
        self.shared.free.len()
    }

    /// Take exclusive ownership of a free session, blocking until one is returned
    ///
    /// Fails with [`Error::PoolStopped`] once [`ConnectionPool::stop`] was called,
    /// including for callers that were already waiting.
    pub fn borrow_link(&self) -> Result<ConnectionLink> {
        if self.shared.draining.load(Ordering::SeqCst) {
            return Err(Error::PoolStopped);
        }

        let session = self.shared.free.dequeue().ok_or(Error::PoolStopped)?;
        tracing::trace!(session = session.id(), "Session borrowed");

        Ok(ConnectionLink {
            session: Some(session),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Drain the pool and join every session worker
    ///
    /// Free sessions are closed immediately and blocked borrowers are woken with
    /// an error. Sessions still lent out are closed when their link is dropped,
    /// and this call waits for that, so it must not be invoked while the
    /// calling thread holds a link. Calling it again is a no-op.
    pub fn stop(&self) {
        if self.shared.draining.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!(endpoint = %self.endpoint, "Stopping connection pool");
        self.shared.free.stop();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                tracing::warn!("Session worker panicked");
            }
        }

        tracing::info!("Connection pool stopped");
    }
}

impl ConnectionSource for ConnectionPool {
    fn borrow(&self) -> Result<Box<dyn Link>> {
        Ok(Box::new(self.borrow_link()?))
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Exclusive handle to one pooled session
///
/// The session goes back to the pool when the link is dropped, whether the
/// exchange succeeded or not.
pub struct ConnectionLink {
    session: Option<WebSocketSession>,
    shared: Arc<PoolShared>,
}

impl ConnectionLink {
    pub fn session_id(&self) -> Option<usize> {
        self.session.as_ref().map(WebSocketSession::id)
    }

    fn session(&self) -> Result<&WebSocketSession> {
        self.session.as_ref().ok_or(Error::ConnectionClosed)
    }
}

impl Link for ConnectionLink {
    fn write(&mut self, data: String) -> Result<()> {
        self.session()?.write(data)
    }

    fn read_one(&mut self) -> Result<String> {
        self.session()?.read_one()
    }
}

impl Drop for ConnectionLink {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::trace!(session = session.id(), "Session released");
            // A stopped queue hands the session to its deleter, which closes it
            self.shared.free.enqueue(session);
        }
    }
}
