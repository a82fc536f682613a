//! Supervisor for long-lived background loops.
//!
//! Every loop receives a child of one [`CancellationToken`]; `shutdown`
//! cancels it and joins each task, so no loop outlives its owner.

use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct Background {
    token: CancellationToken,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Default for Background {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Background {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Background")
            .field("tasks", &self.names())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl Background {
    pub fn new() -> Self {
        Background {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Token cancelled by `shutdown`, for work that is not a spawned loop.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn `make(token)` as a named task. The loop must return once the
    /// token is cancelled.
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, make: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(make(self.token.child_token()));
        debug!(task = %name, "Background task spawned");
        self.tasks.lock().push((name, handle));
    }

    pub fn names(&self) -> Vec<String> {
        self.tasks.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Cancel every task and wait for each to exit.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for (name, handle) in tasks {
            match handle.await {
                Ok(()) => debug!(task = %name, "Background task stopped"),
                Err(e) if e.is_panic() => error!(task = %name, "Background task panicked"),
                Err(e) => error!(task = %name, error = %e, "Background task aborted"),
            }
        }
        info!("Background tasks stopped");
    }
}
