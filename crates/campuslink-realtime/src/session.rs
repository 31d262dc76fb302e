use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use campuslink_types::{Id, InboundEvent, InboundFrame, OutboundCommand, UserIdentity};

use crate::config::ChannelConfig;
use crate::endpoint::chat_endpoint;
use crate::error::Result;
use crate::transport::{Connector, Frame, Link};

/// Upper bound on waiting for our close frame to go out on teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of a channel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing bound yet.
    Idle,
    Connecting,
    Open,
    /// The transport closed; the next attempt is waiting on the reconnect delay.
    ReconnectPending,
    /// Torn down by the owner. Terminal.
    Closed,
}

/// Receives inbound events, in arrival order, on the session's driver task.
pub trait EventHandler: Send + 'static {
    fn on_event(&mut self, event: InboundEvent);
}

impl<F> EventHandler for F
where
    F: FnMut(InboundEvent) + Send + 'static,
{
    fn on_event(&mut self, event: InboundEvent) {
        self(event)
    }
}

impl EventHandler for mpsc::UnboundedSender<InboundEvent> {
    fn on_event(&mut self, event: InboundEvent) {
        let _ = self.send(event);
    }
}

/// State shared between a session handle and its driver task.
struct Shared {
    state: watch::Sender<ConnectionState>,
    /// Present only while a transport is open.
    writer: Mutex<Option<mpsc::UnboundedSender<String>>>,
    cancel: CancellationToken,
}

impl Shared {
    fn writer(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next` unless the session was already closed by its owner.
    fn transition(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Install the writer for a freshly opened transport. Refused once
    /// the session is cancelled so a late open cannot resurrect it.
    fn install_writer(&self, tx: mpsc::UnboundedSender<String>) -> bool {
        let mut writer = self.writer();
        if self.cancel.is_cancelled() {
            return false;
        }
        *writer = Some(tx);
        true
    }
}

/// A live (or reconnecting) binding between one conversation and one
/// transport.
///
/// Opening spawns a driver task on the current Tokio runtime. The driver
/// connects, dispatches inbound frames to the handler, and after every
/// close waits the configured delay before connecting again, for as long
/// as the session is not disconnected.
pub struct ChannelSession {
    conversation_id: String,
    user: UserIdentity,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl ChannelSession {
    /// Open a session for `conversation_id` on behalf of `user`.
    ///
    /// Fails only if the endpoint cannot be derived from the configured
    /// API origin. Transport failures never surface here; they feed the
    /// reconnect loop. Must be called from within a Tokio runtime.
    pub fn open<C, H>(
        config: &ChannelConfig,
        connector: Arc<C>,
        conversation_id: impl Into<String>,
        user: UserIdentity,
        handler: H,
    ) -> Result<Self>
    where
        C: Connector,
        H: EventHandler,
    {
        let conversation_id = conversation_id.into();
        let url = chat_endpoint(&config.api_origin, &conversation_id)?;

        let (state, _) = watch::channel(ConnectionState::Idle);
        let shared = Arc::new(Shared {
            state,
            writer: Mutex::new(None),
            cancel: CancellationToken::new(),
        });

        info!(
            conversation = %conversation_id,
            user = %user.id,
            "opening chat channel at {}",
            url
        );

        let driver = Driver {
            url,
            conversation_id: conversation_id.clone(),
            connector,
            handler,
            shared: shared.clone(),
            reconnect_delay: config.reconnect_delay,
        };
        let task = tokio::spawn(driver.run());

        Ok(Self {
            conversation_id,
            user,
            shared,
            task: Some(task),
        })
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Hand a command to the open transport. Returns `false`, without
    /// queueing anything, when no transport is open.
    pub fn send(&self, command: OutboundCommand) -> bool {
        let writer = self.shared.writer();
        let Some(tx) = writer.as_ref() else {
            debug!(
                conversation = %self.conversation_id,
                "chat channel not open, dropping {:?}",
                command
            );
            return false;
        };

        match command.to_json() {
            Ok(text) => tx.send(text).is_ok(),
            Err(e) => {
                warn!("failed to encode {:?}: {}", command, e);
                false
            }
        }
    }

    pub fn send_chat_message(&self, content: impl Into<String>) -> bool {
        self.send(OutboundCommand::ChatMessage {
            content: content.into(),
        })
    }

    pub fn send_typing(&self, is_typing: bool) -> bool {
        self.send(OutboundCommand::typing(is_typing))
    }

    pub fn mark_message_read(&self, message_id: impl Into<Id>) -> bool {
        self.send(OutboundCommand::MessageRead {
            message_id: message_id.into(),
        })
    }

    pub fn add_reaction(&self, message_id: impl Into<Id>, emoji: impl Into<String>) -> bool {
        self.send(OutboundCommand::AddReaction {
            message_id: message_id.into(),
            emoji: emoji.into(),
        })
    }

    pub fn remove_reaction(&self, message_id: impl Into<Id>, emoji: impl Into<String>) -> bool {
        self.send(OutboundCommand::RemoveReaction {
            message_id: message_id.into(),
            emoji: emoji.into(),
        })
    }

    /// Tear the session down: cancel any pending reconnect, drop the
    /// writer and stop the driver, which closes a live transport.
    /// Safe to call any number of times.
    pub fn disconnect(&self) {
        self.shared.cancel.cancel();
        self.shared.writer().take();

        let changed = self.shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                return false;
            }
            *state = ConnectionState::Closed;
            true
        });
        if changed {
            info!(conversation = %self.conversation_id, "chat channel disconnected");
        }
    }

    /// Disconnect and wait until the driver has released its transport.
    pub async fn shutdown(mut self) {
        self.disconnect();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("chat channel driver ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Why a transport stopped being pumped.
#[derive(Debug, PartialEq, Eq)]
enum PumpExit {
    /// The transport went away at the given instant.
    Closed(Instant),
    Cancelled,
}

struct Driver<C, H> {
    url: Url,
    conversation_id: String,
    connector: Arc<C>,
    handler: H,
    shared: Arc<Shared>,
    reconnect_delay: Duration,
}

impl<C: Connector, H: EventHandler> Driver<C, H> {
    async fn run(mut self) {
        let cancel = self.shared.cancel.clone();
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            self.shared.transition(ConnectionState::Connecting);
            debug!(conversation = %self.conversation_id, attempt, "connecting chat channel");

            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.connector.connect(self.url.clone()) => result,
            };

            let closed_at = match connected {
                Ok(link) => match self.pump(link, &cancel).await {
                    PumpExit::Closed(at) => at,
                    PumpExit::Cancelled => break,
                },
                Err(e) => {
                    warn!(conversation = %self.conversation_id, "chat channel connect failed: {}", e);
                    Instant::now()
                }
            };

            if cancel.is_cancelled() {
                break;
            }

            self.shared.transition(ConnectionState::ReconnectPending);
            info!(
                conversation = %self.conversation_id,
                "chat channel closed, reconnecting in {:?}",
                self.reconnect_delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(closed_at + self.reconnect_delay) => {}
            }
        }

        debug!(conversation = %self.conversation_id, "chat channel driver stopped");
    }

    async fn pump(&mut self, link: Link, cancel: &CancellationToken) -> PumpExit {
        let Link {
            mut sink,
            mut stream,
        } = link;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if !self.shared.install_writer(tx) {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
            return PumpExit::Cancelled;
        }
        self.shared.transition(ConnectionState::Open);
        info!(conversation = %self.conversation_id, "chat channel open");

        let exit = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break PumpExit::Cancelled,
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.dispatch(&text),
                    Some(Ok(Frame::Close)) => break PumpExit::Closed(Instant::now()),
                    Some(Err(e)) => {
                        // Errors are followed by the close; recovery happens there.
                        warn!(conversation = %self.conversation_id, "chat transport error: {}", e);
                        break PumpExit::Closed(Instant::now());
                    }
                    None => break PumpExit::Closed(Instant::now()),
                },
                Some(text) = rx.recv() => {
                    if let Err(e) = sink.send(text).await {
                        warn!(conversation = %self.conversation_id, "chat transport write failed: {}", e);
                        break PumpExit::Closed(Instant::now());
                    }
                }
            }
        };

        // Leave Open together with the writer, before the close handshake.
        self.shared.writer().take();
        if matches!(exit, PumpExit::Closed(_)) {
            self.shared.transition(ConnectionState::ReconnectPending);
        }
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
        exit
    }

    fn dispatch(&mut self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    conversation = %self.conversation_id,
                    "dropping malformed frame: {} -- raw: {}",
                    e,
                    preview(text)
                );
                return;
            }
        };

        match frame.into_event() {
            Some(event) => {
                trace!(conversation = %self.conversation_id, kind = event.kind(), "inbound event");
                self.handler.on_event(event);
            }
            None => debug!(
                conversation = %self.conversation_id,
                "ignoring frame: {}",
                preview(text)
            ),
        }
    }
}

fn preview(text: &str) -> &str {
    let end = text.char_indices().nth(200).map_or(text.len(), |(i, _)| i);
    &text[..end]
}
