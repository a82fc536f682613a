//! RESP2 transport to a Redis-protocol server.
//!
//! Two TCP connections per store: one carries commands strictly
//! request/response, the other sits in PSUBSCRIBE mode and turns
//! `__keyspace@<db>__:<key>` messages into [`KeyEvent`]s.
//!
//! The command connection is owned by a writer task fed through an mpsc
//! channel. Each request is sent and its reply read by that task, so a caller
//! that stops waiting never leaves a reply behind for the next caller.

use super::connection::Connection;
use crate::error::{Result, StoreError};
use crate::keyspace::{Command, KeyEvent, Reply, RespCodec};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

const NOTIFICATION_CAPACITY: usize = 1024;

type Transport = Framed<TcpStream, RespCodec>;

struct Request {
    args: Vec<Bytes>,
    response_tx: oneshot::Sender<Result<Reply>>,
}

pub struct RespConnection {
    addr: String,
    db: u32,
    commands: mpsc::UnboundedSender<Request>,
    writer: JoinHandle<()>,
    events: broadcast::Sender<KeyEvent>,
    listener: JoinHandle<()>,
}

/// Run requests one at a time to completion, whether or not the caller is
/// still waiting for the reply.
async fn run_commands(mut transport: Transport, mut rx: mpsc::UnboundedReceiver<Request>) {
    while let Some(Request { args, response_tx }) = rx.recv().await {
        let result = round_trip(&mut transport, args).await;
        let closed = matches!(result, Err(StoreError::Unavailable(_)));
        if response_tx.send(result).is_err() {
            trace!("caller dropped before reply");
        }
        if closed {
            warn!("command connection failed");
            break;
        }
    }
    debug!("command writer stopped");
}

async fn round_trip(transport: &mut Transport, args: Vec<Bytes>) -> Result<Reply> {
    transport.send(args).await?;
    match transport.next().await {
        Some(reply) => Ok(reply?),
        None => Err(StoreError::unavailable("connection closed by server")),
    }
}

fn argv(parts: &[&str]) -> Vec<Bytes> {
    parts
        .iter()
        .map(|p| Bytes::copy_from_slice(p.as_bytes()))
        .collect()
}

async fn open(addr: &str, db: u32) -> Result<Transport> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let mut transport = Framed::new(stream, RespCodec);
    if db != 0 {
        if let Reply::Error(e) = round_trip(&mut transport, argv(&["SELECT", &db.to_string()])).await? {
            return Err(StoreError::Backend(e));
        }
    }
    Ok(transport)
}

/// Decode a `pmessage` push into a key event.
fn parse_pmessage(reply: Reply, channel_prefix: &str) -> Option<KeyEvent> {
    let Reply::Array(Some(parts)) = reply else {
        return None;
    };
    let [kind, _pattern, channel, event] = parts.as_slice() else {
        return None;
    };
    match kind {
        Reply::Bulk(Some(k)) if &k[..] == b"pmessage" => {}
        _ => return None,
    }
    let (Reply::Bulk(Some(channel)), Reply::Bulk(Some(event))) = (channel, event) else {
        return None;
    };
    let channel = String::from_utf8_lossy(channel);
    let key = channel.strip_prefix(channel_prefix)?;
    Some(KeyEvent {
        key: key.to_string(),
        event: String::from_utf8_lossy(event).into_owned(),
    })
}

impl RespConnection {
    /// Connect to `addr`, select `db` and subscribe to notifications for keys
    /// starting with `prefix`.
    pub async fn connect(addr: &str, db: u32, prefix: &str) -> Result<Self> {
        let mut commands = open(addr, db).await?;

        // Keyspace notifications are off by default on a stock server.
        match round_trip(
            &mut commands,
            argv(&["CONFIG", "SET", "notify-keyspace-events", "KA"]),
        )
        .await?
        {
            Reply::Error(e) => warn!(addr, error = %e, "could not enable keyspace notifications"),
            _ => debug!(addr, "keyspace notifications enabled"),
        }

        let mut subscriber = open(addr, db).await?;
        let channel_prefix = format!("__keyspace@{}__:", db);
        let pattern = format!("{}{}*", channel_prefix, prefix);
        subscriber.send(argv(&["PSUBSCRIBE", &pattern])).await?;

        let (events, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let tx = events.clone();
        let listener = tokio::spawn(async move {
            while let Some(frame) = subscriber.next().await {
                match frame {
                    Ok(reply) => {
                        if let Some(event) = parse_pmessage(reply, &channel_prefix) {
                            let _ = tx.send(event);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "notification stream failed");
                        break;
                    }
                }
            }
            debug!("notification listener stopped");
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_commands(commands, rx));

        info!(addr, db, pattern = %pattern, "connected to backing store");
        Ok(RespConnection {
            addr: addr.to_string(),
            db,
            commands: tx,
            writer,
            events,
            listener,
        })
    }
}

impl Drop for RespConnection {
    fn drop(&mut self) {
        self.listener.abort();
        self.writer.abort();
    }
}

impl Connection for RespConnection {
    fn call<'a>(&'a self, cmd: Command) -> Pin<Box<dyn Future<Output = Result<Reply>> + Send + 'a>> {
        Box::pin(async move {
            let (response_tx, response_rx) = oneshot::channel();
            let request = Request {
                args: cmd.to_args(),
                response_tx,
            };
            if self.commands.send(request).is_err() {
                return Err(StoreError::unavailable("command connection closed"));
            }
            response_rx
                .await
                .unwrap_or_else(|_| Err(StoreError::unavailable("command connection closed")))
        })
    }

    fn notifications(&self) -> broadcast::Receiver<KeyEvent> {
        self.events.subscribe()
    }

    fn describe(&self) -> String {
        format!("redis://{}/{}", self.addr, self.db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Reply {
        Reply::bulk(s.to_string())
    }

    #[test]
    fn test_parse_pmessage() {
        let reply = Reply::array(vec![
            bulk("pmessage"),
            bulk("__keyspace@0__:trash*"),
            bulk("__keyspace@0__:trash"),
            bulk("zadd"),
        ]);
        let event = parse_pmessage(reply, "__keyspace@0__:").unwrap();
        assert_eq!(event.key, "trash");
        assert_eq!(event.event, "zadd");
    }

    #[test]
    fn test_parse_pmessage_ignores_subscribe_ack() {
        let ack = Reply::array(vec![bulk("psubscribe"), bulk("p*"), Reply::Integer(1)]);
        assert!(parse_pmessage(ack, "__keyspace@0__:").is_none());
    }

    #[tokio::test]
    async fn test_round_trip_against_fake_server() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let n = socket.read(&mut buf).await.unwrap();
            assert!(buf[..n].starts_with(b"*1\r\n$4\r\nPING\r\n"));
            socket.write_all(b"+PONG\r\n").await.unwrap();
        });

        let mut transport = open(&addr.to_string(), 0).await.unwrap();
        let reply = round_trip(&mut transport, argv(&["PING"])).await.unwrap();
        assert_eq!(reply, Reply::Status("PONG".to_string()));
    }

    /// Answer GETs with `val-<key>`, holding the reply to `slow` back.
    async fn serve_commands(socket: TcpStream) {
        use tokio::io::AsyncWriteExt;
        use tokio_util::codec::FramedRead;

        let (read, mut write) = socket.into_split();
        let mut frames = FramedRead::new(read, RespCodec);
        while let Some(Ok(Reply::Array(Some(parts)))) = frames.next().await {
            let words: Vec<String> = parts
                .iter()
                .filter_map(|p| match p {
                    Reply::Bulk(Some(b)) => Some(String::from_utf8_lossy(b).into_owned()),
                    _ => None,
                })
                .collect();
            let out = match words.as_slice() {
                [cmd, key] if cmd == "GET" => {
                    if key == "slow" {
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                    let value = format!("val-{}", key);
                    format!("${}\r\n{}\r\n", value.len(), value)
                }
                _ => "+OK\r\n".to_string(),
            };
            if write.write_all(out.as_bytes()).await.is_err() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_abandoned_call_does_not_shift_replies() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (commands, _) = listener.accept().await.unwrap();
            tokio::spawn(serve_commands(commands));
            let (mut subscriber, _) = listener.accept().await.unwrap();
            let mut sink = vec![0u8; 256];
            while let Ok(n) = subscriber.read(&mut sink).await {
                if n == 0 {
                    break;
                }
            }
        });

        let conn = RespConnection::connect(&addr.to_string(), 0, "").await.unwrap();

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            conn.call(Command::Get("slow".to_string())),
        )
        .await;
        assert!(abandoned.is_err());

        let reply = conn.call(Command::Get("fast".to_string())).await.unwrap();
        assert_eq!(reply, Reply::bulk("val-fast"));
        let reply = conn.call(Command::Get("slow".to_string())).await.unwrap();
        assert_eq!(reply, Reply::bulk("val-slow"));
    }
}
