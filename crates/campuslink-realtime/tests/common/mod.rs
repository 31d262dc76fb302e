//! In-memory transport for driving sessions without a network.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use futures_util::future::{self, BoxFuture};
use futures_util::{Sink, StreamExt, stream};
use tokio::sync::{mpsc, watch};
use url::Url;

use campuslink_realtime::{ChannelError, ConnectionState, Connector, Frame, Link, Result};

#[derive(Default)]
struct Counters {
    attempts: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    refuse: AtomicBool,
    hang: AtomicBool,
    stall_close: AtomicBool,
}

/// Keeps the live-transport count honest: dropped with the client's
/// read half.
struct LiveGuard(Arc<Counters>);

impl LiveGuard {
    fn new(counters: Arc<Counters>) -> Self {
        let live = counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_live.fetch_max(live, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The server side of one accepted in-memory transport.
pub struct ServerEnd {
    pub url: Url,
    to_client: Option<mpsc::UnboundedSender<Result<Frame>>>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn push_text(&self, text: impl Into<String>) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Ok(Frame::Text(text.into())));
        }
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push_text(value.to_string());
    }

    pub fn push_error(&self) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Err(ChannelError::Transport("connection reset".into())));
        }
    }

    /// Send a close frame, as a server ending the socket gracefully.
    pub fn push_close(&self) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Ok(Frame::Close));
        }
    }

    /// Drop the server's write half; the client sees the stream end.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }
}

#[derive(Clone)]
pub struct MemoryConnector {
    counters: Arc<Counters>,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        (
            Self {
                counters: Arc::new(Counters::default()),
                accepted,
            },
            rx,
        )
    }

    pub fn attempts(&self) -> usize {
        self.counters.attempts.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    /// Make every following connect attempt fail.
    pub fn refuse(&self, refuse: bool) {
        self.counters.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make the close handshake of following transports never finish.
    pub fn stall_close(&self, stall: bool) {
        self.counters.stall_close.store(stall, Ordering::SeqCst);
    }

    /// Make every following connect attempt stay pending forever.
    pub fn hang(&self, hang: bool) {
        self.counters.hang.store(hang, Ordering::SeqCst);
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Link>> {
        self.counters.attempts.fetch_add(1, Ordering::SeqCst);

        if self.counters.hang.load(Ordering::SeqCst) {
            return Box::pin(future::pending());
        }
        if self.counters.refuse.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Err(ChannelError::Transport(
                "connection refused".into(),
            ))));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel::<Result<Frame>>();
        let (client_tx, from_client) = mpsc::unbounded_channel::<String>();
        let guard = LiveGuard::new(self.counters.clone());

        let stream = stream::unfold((client_rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|frame| (frame, (rx, guard)))
        });
        let sink = ClientSink {
            tx: client_tx,
            stall_close: self.counters.stall_close.load(Ordering::SeqCst),
        };

        let _ = self.accepted.send(ServerEnd {
            url,
            to_client: Some(to_client),
            from_client,
        });

        Box::pin(future::ready(Ok(Link {
            sink: Box::pin(sink),
            stream: stream.boxed(),
        })))
    }
}

/// Client write half of an in-memory transport.
struct ClientSink {
    tx: mpsc::UnboundedSender<String>,
    stall_close: bool,
}

impl Sink<String> for ClientSink {
    type Error = ChannelError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, text: String) -> Result<()> {
        self.tx
            .send(text)
            .map_err(|_| ChannelError::Transport("server end dropped".into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        if self.stall_close {
            Poll::Pending
        } else {
            Poll::Ready(Ok(()))
        }
    }
}

pub fn test_config() -> campuslink_realtime::ChannelConfig {
    campuslink_realtime::ChannelConfig::new("http://campus.test/api")
}

pub fn alice() -> campuslink_realtime::UserIdentity {
    campuslink_realtime::UserIdentity::new("u1", "alice")
}

pub async fn wait_for(rx: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
    rx.wait_for(|state| *state == want)
        .await
        .expect("session state channel closed");
}
