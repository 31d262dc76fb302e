use std::pin::Pin;

use futures_util::future::{self, BoxFuture};
use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use crate::error::{ChannelError, Result};

/// One unit read off the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The peer started a close handshake.
    Close,
}

/// Write half of a live transport. Accepts serialized text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ChannelError> + Send>>;

/// Read half of a live transport. Ends when the transport is gone.
pub type FrameStream = BoxStream<'static, Result<Frame>>;

/// An open transport, split into its two halves.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens transports for a session. The production implementation is
/// [`WsConnector`]; tests drive sessions through an in-memory one.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Link>>;
}

/// Connects over WebSocket with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Link>> {
        Box::pin(async move {
            let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
            let (ws_tx, ws_rx) = ws_stream.split();

            let sink = ws_tx
                .sink_map_err(ChannelError::from)
                .with(|text: String| future::ready(Ok::<_, ChannelError>(Message::Text(text.into()))));

            // Ping/Pong are answered inside tungstenite while the stream is polled.
            let stream = ws_rx.filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                    Ok(Message::Close(reason)) => {
                        debug!("peer closed chat socket: {:?}", reason);
                        Some(Ok(Frame::Close))
                    }
                    Ok(Message::Binary(data)) => {
                        debug!("skipping {} byte binary frame", data.len());
                        None
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(ChannelError::from(e))),
                })
            });

            Ok(Link {
                sink: Box::pin(sink),
                stream: stream.boxed(),
            })
        })
    }
}
