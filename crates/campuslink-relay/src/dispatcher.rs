use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use campuslink_types::InboundEvent;

/// Per-conversation backlog before slow subscribers start lagging.
const ROOM_CAPACITY: usize = 256;

/// An event fanned out to one conversation, serialized once.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Connection that caused the event.
    pub origin: Uuid,
    /// Skip delivery back to `origin` (typing, read receipts).
    pub skip_origin: bool,
    pub json: Arc<str>,
}

impl Envelope {
    pub fn new(origin: Uuid, skip_origin: bool, event: &InboundEvent) -> serde_json::Result<Self> {
        Ok(Self {
            origin,
            skip_origin,
            json: serde_json::to_string(event)?.into(),
        })
    }

    pub fn is_for(&self, conn_id: Uuid) -> bool {
        !(self.skip_origin && self.origin == conn_id)
    }
}

/// Routes events between the connections of each conversation.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// conversation_id -> broadcast sender
    rooms: RwLock<HashMap<String, broadcast::Sender<Envelope>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a conversation, creating its room on first use.
    pub async fn join(&self, conversation_id: &str) -> Membership {
        let mut rooms = self.inner.rooms.write().await;
        let rx = rooms
            .entry(conversation_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe();
        Membership {
            dispatcher: self.clone(),
            conversation_id: conversation_id.to_string(),
            rx: Some(rx),
        }
    }

    /// Deliver to every connection in the conversation.
    pub async fn broadcast(&self, conversation_id: &str, envelope: Envelope) {
        let rooms = self.inner.rooms.read().await;
        if let Some(tx) = rooms.get(conversation_id) {
            let _ = tx.send(envelope);
        }
    }

    /// Drop the room once its last receiver is gone.
    async fn leave(&self, conversation_id: &str) {
        let mut rooms = self.inner.rooms.write().await;
        if rooms
            .get(conversation_id)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            rooms.remove(conversation_id);
        }
    }

    pub async fn room_count(&self) -> usize {
        self.inner.rooms.read().await.len()
    }
}

/// One connection's subscription to a room. Dropping it leaves the room,
/// whether or not the socket upgrade ever completed.
pub struct Membership {
    dispatcher: Dispatcher,
    conversation_id: String,
    rx: Option<broadcast::Receiver<Envelope>>,
}

impl Membership {
    pub async fn recv(&mut self) -> Result<Envelope, RecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => Err(RecvError::Closed),
        }
    }

    pub fn try_recv(&mut self) -> Result<Envelope, TryRecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.try_recv(),
            None => Err(TryRecvError::Closed),
        }
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        // The receiver must be gone before the room's receiver count is checked.
        self.rx.take();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let dispatcher = self.dispatcher.clone();
        let conversation_id = std::mem::take(&mut self.conversation_id);
        handle.spawn(async move { dispatcher.leave(&conversation_id).await });
    }
}
