//! Actor that owns the embedded keyspace.
//!
//! All commands funnel through one mpsc channel into a single task, so every
//! command (and every Lua script) executes atomically with respect to all
//! others. After each command the actor publishes the writes it made on a
//! broadcast channel, mirroring Redis keyspace notifications.

use super::command::Command;
use super::executor::{Executor, KeyEvent};
use super::reply::Reply;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, trace};

const NOTIFICATION_CAPACITY: usize = 1024;

#[derive(Debug)]
pub enum KeyspaceMessage {
    Command {
        cmd: Command,
        response_tx: oneshot::Sender<Reply>,
    },
    Stats {
        response_tx: oneshot::Sender<KeyspaceStats>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyspaceStats {
    pub keys: usize,
    pub commands_processed: u64,
}

pub struct KeyspaceActor {
    executor: Executor,
    rx: mpsc::UnboundedReceiver<KeyspaceMessage>,
    events: broadcast::Sender<KeyEvent>,
}

impl KeyspaceActor {
    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                KeyspaceMessage::Command { cmd, response_tx } => {
                    trace!(?cmd, "keyspace command");
                    let response = self.executor.execute(&cmd);
                    for event in self.executor.drain_events() {
                        // No receivers is fine
                        let _ = self.events.send(event);
                    }
                    let _ = response_tx.send(response);
                }
                KeyspaceMessage::Stats { response_tx } => {
                    let _ = response_tx.send(KeyspaceStats {
                        keys: self.executor.key_count(),
                        commands_processed: self.executor.commands_processed(),
                    });
                }
            }
        }
        debug!("keyspace actor stopped");
    }
}

/// Cloneable handle to a running keyspace actor.
///
/// The actor stops once every handle is dropped.
#[derive(Clone)]
pub struct KeyspaceHandle {
    tx: mpsc::UnboundedSender<KeyspaceMessage>,
    events: broadcast::Sender<KeyEvent>,
}

impl KeyspaceHandle {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let actor = KeyspaceActor {
            executor: Executor::new(),
            rx,
            events: events.clone(),
        };
        tokio::spawn(actor.run());
        KeyspaceHandle { tx, events }
    }

    pub async fn execute(&self, cmd: Command) -> Reply {
        let (response_tx, response_rx) = oneshot::channel();
        let msg = KeyspaceMessage::Command { cmd, response_tx };

        if self.tx.send(msg).is_err() {
            return Reply::err("ERR keyspace unavailable");
        }

        response_rx
            .await
            .unwrap_or_else(|_| Reply::err("ERR keyspace response dropped"))
    }

    pub async fn stats(&self) -> Option<KeyspaceStats> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(KeyspaceMessage::Stats { response_tx })
            .ok()?;
        response_rx.await.ok()
    }

    /// Receive every write made after this call.
    pub fn events(&self) -> broadcast::Receiver<KeyEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_handle_round_trip_and_events() {
        let handle = KeyspaceHandle::spawn();
        let mut events = handle.events();

        let reply = handle
            .execute(Command::Set("k".to_string(), Bytes::from_static(b"v")))
            .await;
        assert_eq!(reply, Reply::ok());
        assert_eq!(
            handle.execute(Command::Get("k".to_string())).await,
            Reply::bulk("v")
        );

        let event = events.recv().await.unwrap();
        assert_eq!(event.key, "k");
        assert_eq!(event.event, "set");

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.commands_processed, 2);
    }

    #[tokio::test]
    async fn test_concurrent_incr_is_serialized() {
        let handle = KeyspaceHandle::spawn();
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let h = handle.clone();
            tasks.push(tokio::spawn(async move {
                h.execute(Command::Incr("n".to_string())).await
            }));
        }
        for t in tasks {
            assert!(!t.await.unwrap().is_error());
        }
        assert_eq!(
            handle.execute(Command::Get("n".to_string())).await,
            Reply::bulk("50")
        );
    }
}
