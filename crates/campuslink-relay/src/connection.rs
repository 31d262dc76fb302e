use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use campuslink_types::{ChatMessage, Id, InboundEvent, OutboundCommand, Reaction};

use crate::dispatcher::{Dispatcher, Envelope, Membership};

/// The relay pings every 15 seconds; two missed pongs drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Who is on the other end of a relay connection.
#[derive(Debug, Clone)]
pub struct Participant {
    pub conn_id: Uuid,
    pub user_id: Id,
    pub username: String,
}

impl Participant {
    /// The relay does not authenticate; every connection gets a guest identity.
    pub fn guest() -> Self {
        let conn_id = Uuid::new_v4();
        let mut short = conn_id.simple().to_string();
        short.truncate(8);
        Self {
            conn_id,
            user_id: Id::new(conn_id.to_string()),
            username: format!("guest-{}", short),
        }
    }
}

/// Run one chat socket until either side goes away. `membership` must be
/// taken before the upgrade completes so nothing sent after the client
/// sees the socket open is missed. The room is left when it drops.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    conversation_id: String,
    mut membership: Membership,
    participant: Participant,
) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = participant.conn_id;

    info!(
        "{} ({}) joined conversation {}",
        participant.username, participant.user_id, conversation_id
    );

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = membership.recv() => {
                    let envelope = match result {
                        Ok(envelope) => envelope,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Room receiver lagged by {} events", n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if !envelope.is_for(conn_id) {
                        continue;
                    }
                    if sender.send(Message::Text(envelope.json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Client commands -> room
    let recv_dispatcher = dispatcher.clone();
    let recv_conversation = conversation_id.clone();
    let recv_participant = participant.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<OutboundCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&recv_dispatcher, &recv_conversation, &recv_participant, cmd)
                            .await;
                    }
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_participant.username, recv_participant.user_id, e, raw
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(
        "{} ({}) left conversation {}",
        participant.username, participant.user_id, conversation_id
    );
}

/// Translate a client command into the event the room should see.
/// Returns the event and whether the sender should be skipped.
pub fn command_to_event(participant: &Participant, cmd: OutboundCommand) -> Option<(InboundEvent, bool)> {
    match cmd {
        OutboundCommand::ChatMessage { content } => {
            if content.trim().is_empty() {
                return None;
            }
            let mut extra = Map::new();
            extra.insert(
                "sender".into(),
                json!({ "id": participant.user_id, "username": participant.username }),
            );
            extra.insert("created_at".into(), Value::String(Utc::now().to_rfc3339()));
            let message = ChatMessage {
                id: Some(Id::new(Uuid::new_v4().to_string())),
                content,
                extra,
            };
            Some((InboundEvent::ChatMessage { message }, false))
        }

        OutboundCommand::TypingStart => Some((typing_event(participant, true), true)),

        OutboundCommand::TypingStop => Some((typing_event(participant, false), true)),

        OutboundCommand::MessageRead { message_id } => Some((
            InboundEvent::ReadReceipt {
                message_id,
                user_id: participant.user_id.clone(),
                username: participant.username.clone(),
            },
            true,
        )),

        OutboundCommand::AddReaction { message_id, emoji } => Some((
            InboundEvent::ReactionAdded {
                message_id,
                reaction: Reaction {
                    emoji: Some(emoji),
                    user_id: Some(participant.user_id.clone()),
                    username: Some(participant.username.clone()),
                    extra: Map::new(),
                },
            },
            false,
        )),

        OutboundCommand::RemoveReaction { message_id, emoji } => Some((
            InboundEvent::ReactionRemoved {
                message_id,
                user_id: participant.user_id.clone(),
                emoji,
            },
            false,
        )),
    }
}

fn typing_event(participant: &Participant, typing: bool) -> InboundEvent {
    InboundEvent::Typing {
        user_id: participant.user_id.clone(),
        username: participant.username.clone(),
        typing,
    }
}

async fn handle_command(
    dispatcher: &Dispatcher,
    conversation_id: &str,
    participant: &Participant,
    cmd: OutboundCommand,
) {
    debug!("{} ({}) -> {:?}", participant.username, participant.user_id, cmd);

    let Some((event, skip_origin)) = command_to_event(participant, cmd) else {
        return;
    };

    match Envelope::new(participant.conn_id, skip_origin, &event) {
        Ok(envelope) => dispatcher.broadcast(conversation_id, envelope).await,
        Err(e) => warn!("failed to encode {} event: {}", event.kind(), e),
    }
}
