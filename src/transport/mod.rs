//! Network transport
//!
//! WebSocket sessions, the bounded pool that lends them out, and the HTTP
//! helper used by template callbacks.

mod http;
mod pool;
mod queue;
mod session;

pub use http::{Fetcher, HttpFetcher};
pub use pool::{ConnectionLink, ConnectionPool, DEFAULT_CONNECT_TIMEOUT, DEFAULT_POOL_SIZE};
pub use queue::BlockingQueue;
pub use session::{Endpoint, SessionState, SessionWorker, WebSocketSession};

use crate::common::Result;

/// One exclusively borrowed connection
pub trait Link: Send {
    /// Send one text frame
    fn write(&mut self, data: String) -> Result<()>;

    /// Wait for the next text frame
    fn read_one(&mut self) -> Result<String>;
}

/// Anything that lends out [`Link`]s
pub trait ConnectionSource: Send + Sync {
    /// Block until a link is available
    fn borrow(&self) -> Result<Box<dyn Link>>;
}
