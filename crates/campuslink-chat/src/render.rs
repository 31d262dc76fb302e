use campuslink_types::{ChatMessage, InboundEvent};

/// One terminal line per inbound event.
pub fn render(conversation_id: &str, event: &InboundEvent) -> String {
    let body = match event {
        InboundEvent::ChatMessage { message } => {
            let id = message.id.as_ref().map_or("?", |id| id.as_str());
            format!("<{}> {} [{}]", author(message), message.content, id)
        }
        InboundEvent::Typing {
            username, typing, ..
        } => {
            if *typing {
                format!("{} is typing...", display_name(username))
            } else {
                format!("{} stopped typing", display_name(username))
            }
        }
        InboundEvent::ReadReceipt {
            message_id,
            username,
            ..
        } => format!("{} read {}", display_name(username), message_id),
        InboundEvent::ReactionAdded {
            message_id,
            reaction,
        } => {
            let who = reaction.username.as_deref().unwrap_or("someone");
            let emoji = reaction.emoji.as_deref().unwrap_or("?");
            format!("{} reacted {} to {}", display_name(who), emoji, message_id)
        }
        InboundEvent::ReactionRemoved {
            message_id,
            user_id,
            emoji,
        } => format!("{} removed {} from {}", user_id, emoji, message_id),
    };
    format!("[{}] {}", conversation_id, body)
}

fn author(message: &ChatMessage) -> &str {
    message
        .extra
        .get("sender")
        .and_then(|sender| sender.get("username"))
        .and_then(|name| name.as_str())
        .unwrap_or("?")
}

fn display_name(username: &str) -> &str {
    if username.is_empty() { "someone" } else { username }
}
