//! Connection seam between the typed `Store` client and a transport.

use crate::error::{Result, StoreError};
use crate::keyspace::{Command, KeyEvent, KeyspaceHandle, Reply};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast;

/// A backing-store transport: one command in, one reply out, plus the
/// stream of keyspace notifications for keys this connection can see.
pub trait Connection: Send + Sync + 'static {
    fn call<'a>(&'a self, cmd: Command) -> Pin<Box<dyn Future<Output = Result<Reply>> + Send + 'a>>;

    fn notifications(&self) -> broadcast::Receiver<KeyEvent>;

    /// Human-readable endpoint, for logs.
    fn describe(&self) -> String;
}

impl Connection for KeyspaceHandle {
    fn call<'a>(&'a self, cmd: Command) -> Pin<Box<dyn Future<Output = Result<Reply>> + Send + 'a>> {
        Box::pin(async move {
            match self.execute(cmd).await {
                Reply::Error(e) if e.starts_with("ERR keyspace") => Err(StoreError::unavailable(e)),
                reply => Ok(reply),
            }
        })
    }

    fn notifications(&self) -> broadcast::Receiver<KeyEvent> {
        self.events()
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
