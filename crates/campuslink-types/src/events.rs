use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{ChatMessage, Id, Reaction};

/// A frame received on `/ws/chat/{id}/`, decoded as loosely as the wire
/// allows. Every kind-specific field is optional here; the rules for
/// which fields must be present live in [`InboundFrame::into_event`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    ChatMessage {
        message: Option<ChatMessage>,
    },
    TypingIndicator {
        user_id: Option<Id>,
        /// Outer `None` when absent, inner `None` when `null`.
        #[serde(default, deserialize_with = "present")]
        username: Option<Option<String>>,
        typing: Option<bool>,
    },
    ReadReceipt {
        message_id: Option<Id>,
        user_id: Option<Id>,
        username: Option<String>,
    },
    ReactionAdded {
        message_id: Option<Id>,
        reaction: Option<Reaction>,
    },
    ReactionRemoved {
        message_id: Option<Id>,
        user_id: Option<Id>,
        emoji: Option<String>,
    },
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Validate the frame into a typed event. Returns `None` for unknown
    /// kinds and for frames missing a required field.
    pub fn into_event(self) -> Option<InboundEvent> {
        match self {
            Self::ChatMessage { message } => message.map(|message| InboundEvent::ChatMessage { message }),
            // Empty and null usernames are valid; only an absent one is rejected.
            Self::TypingIndicator {
                user_id,
                username,
                typing,
            } => Some(InboundEvent::Typing {
                user_id: user_id?,
                username: username?.unwrap_or_default(),
                typing: typing.unwrap_or(false),
            }),
            Self::ReadReceipt {
                message_id,
                user_id,
                username,
            } => Some(InboundEvent::ReadReceipt {
                message_id: message_id?,
                user_id: user_id?,
                username: username?,
            }),
            Self::ReactionAdded {
                message_id,
                reaction,
            } => Some(InboundEvent::ReactionAdded {
                message_id: message_id?,
                reaction: reaction?,
            }),
            Self::ReactionRemoved {
                message_id,
                user_id,
                emoji,
            } => Some(InboundEvent::ReactionRemoved {
                message_id: message_id?,
                user_id: user_id?,
                emoji: emoji?,
            }),
            Self::Unknown => None,
        }
    }
}

/// Marks a field as present even when its value is `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Events delivered to a channel's handler.
///
/// Serializes back to the wire form, which the dev relay uses to fan
/// events out to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A new message was posted to the conversation
    ChatMessage { message: ChatMessage },

    /// A participant started or stopped typing
    #[serde(rename = "typing_indicator")]
    Typing {
        user_id: Id,
        username: String,
        typing: bool,
    },

    /// A participant read a message
    ReadReceipt {
        message_id: Id,
        user_id: Id,
        username: String,
    },

    /// A reaction was added to a message
    ReactionAdded { message_id: Id, reaction: Reaction },

    /// A reaction was removed from a message
    ReactionRemoved {
        message_id: Id,
        user_id: Id,
        emoji: String,
    },
}

impl InboundEvent {
    /// Wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatMessage { .. } => "chat_message",
            Self::Typing { .. } => "typing_indicator",
            Self::ReadReceipt { .. } => "read_receipt",
            Self::ReactionAdded { .. } => "reaction_added",
            Self::ReactionRemoved { .. } => "reaction_removed",
        }
    }
}

/// Commands sent FROM client TO server over the chat channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    /// Post a message to the conversation
    ChatMessage { content: String },

    TypingStart,

    TypingStop,

    /// Mark a message as read by the current user
    MessageRead { message_id: Id },

    AddReaction { message_id: Id, emoji: String },

    RemoveReaction { message_id: Id, emoji: String },
}

impl OutboundCommand {
    pub fn typing(is_typing: bool) -> Self {
        if is_typing {
            Self::TypingStart
        } else {
            Self::TypingStop
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(value: serde_json::Value) -> Option<InboundEvent> {
        InboundFrame::parse(&value.to_string()).unwrap().into_event()
    }

    #[test]
    fn typing_indicator_scenario() {
        let ev = event(json!({
            "type": "typing_indicator", "user_id": "u1", "username": "alice", "typing": true
        }));
        assert_eq!(
            ev,
            Some(InboundEvent::Typing {
                user_id: Id::from("u1"),
                username: "alice".into(),
                typing: true,
            })
        );
    }

    #[test]
    fn typing_flag_defaults_to_false() {
        let ev = event(json!({"type": "typing_indicator", "user_id": "u1", "username": "alice"}));
        assert!(matches!(ev, Some(InboundEvent::Typing { typing: false, .. })));
    }

    #[test]
    fn typing_accepts_empty_username_but_not_missing() {
        let empty = event(json!({"type": "typing_indicator", "user_id": "u1", "username": ""}));
        assert!(matches!(empty, Some(InboundEvent::Typing { ref username, .. }) if username.is_empty()));

        let missing = event(json!({"type": "typing_indicator", "user_id": "u1", "typing": true}));
        assert_eq!(missing, None);
    }

    #[test]
    fn typing_treats_null_username_as_present() {
        let ev = event(json!({"type": "typing_indicator", "user_id": "u1", "username": null, "typing": true}));
        assert_eq!(
            ev,
            Some(InboundEvent::Typing {
                user_id: Id::from("u1"),
                username: String::new(),
                typing: true,
            })
        );
    }

    #[test]
    fn chat_message_scenario() {
        let ev = event(json!({"type": "chat_message", "message": {"id": "m1", "content": "hi"}}));
        match ev {
            Some(InboundEvent::ChatMessage { message }) => {
                assert_eq!(message.id, Some(Id::from("m1")));
                assert_eq!(message.content, "hi");
                assert!(message.extra.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn chat_message_with_sparse_payload_is_delivered() {
        let ev = event(json!({
            "type": "chat_message",
            "message": {"content": null, "attachment": {"name": "notes.pdf"}}
        }));
        match ev {
            Some(InboundEvent::ChatMessage { message }) => {
                assert_eq!(message.id, None);
                assert_eq!(message.content, "");
                assert_eq!(message.extra["attachment"]["name"], "notes.pdf");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn chat_message_without_payload_is_dropped() {
        assert_eq!(event(json!({"type": "chat_message"})), None);
    }

    #[test]
    fn read_receipt_requires_all_fields() {
        let full = event(json!({
            "type": "read_receipt", "message_id": 9, "user_id": 2, "username": "bob"
        }));
        assert_eq!(
            full,
            Some(InboundEvent::ReadReceipt {
                message_id: Id::from("9"),
                user_id: Id::from("2"),
                username: "bob".into(),
            })
        );
        assert_eq!(event(json!({"type": "read_receipt", "message_id": 9, "user_id": 2})), None);
    }

    #[test]
    fn reaction_added_carries_payload() {
        let ev = event(json!({
            "type": "reaction_added",
            "message_id": "m1",
            "reaction": {"emoji": "🎉", "user_id": "u3", "username": "carol"}
        }));
        match ev {
            Some(InboundEvent::ReactionAdded { message_id, reaction }) => {
                assert_eq!(message_id, "m1");
                assert_eq!(reaction.emoji.as_deref(), Some("🎉"));
                assert_eq!(reaction.user_id, Some(Id::from("u3")));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(event(json!({"type": "reaction_added", "message_id": "m1"})), None);
        assert_eq!(
            event(json!({"type": "reaction_added", "message_id": "m1", "reaction": null})),
            None
        );
    }

    #[test]
    fn reaction_added_without_emoji_is_delivered() {
        let ev = event(json!({
            "type": "reaction_added", "message_id": "m1", "reaction": {"user_id": "u3"}
        }));
        match ev {
            Some(InboundEvent::ReactionAdded { reaction, .. }) => {
                assert_eq!(reaction.emoji, None);
                assert_eq!(reaction.user_id, Some(Id::from("u3")));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn reaction_removed_scenario() {
        let ev = event(json!({
            "type": "reaction_removed", "message_id": "m1", "user_id": "u2", "emoji": "👍"
        }));
        assert_eq!(
            ev,
            Some(InboundEvent::ReactionRemoved {
                message_id: Id::from("m1"),
                user_id: Id::from("u2"),
                emoji: "👍".into(),
            })
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let frame = InboundFrame::parse(r#"{"type": "presence_update", "online": true}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Unknown));
        assert_eq!(frame.into_event(), None);
    }

    #[test]
    fn malformed_frames_fail_to_parse() {
        assert!(InboundFrame::parse("not json").is_err());
        assert!(InboundFrame::parse("\"hello\"").is_err());
        assert!(InboundFrame::parse(r#"{"message": {"id": "m1"}}"#).is_err());
    }

    #[test]
    fn outbound_commands_are_flat() {
        let cases = [
            (
                OutboundCommand::ChatMessage { content: "hey".into() },
                json!({"type": "chat_message", "content": "hey"}),
            ),
            (OutboundCommand::typing(true), json!({"type": "typing_start"})),
            (OutboundCommand::typing(false), json!({"type": "typing_stop"})),
            (
                OutboundCommand::MessageRead { message_id: "m1".into() },
                json!({"type": "message_read", "message_id": "m1"}),
            ),
            (
                OutboundCommand::AddReaction { message_id: "m1".into(), emoji: "👍".into() },
                json!({"type": "add_reaction", "message_id": "m1", "emoji": "👍"}),
            ),
            (
                OutboundCommand::RemoveReaction { message_id: "m1".into(), emoji: "👍".into() },
                json!({"type": "remove_reaction", "message_id": "m1", "emoji": "👍"}),
            ),
        ];

        for (cmd, expected) in cases {
            let wire: serde_json::Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
            assert_eq!(wire, expected);
        }
    }

    #[test]
    fn events_serialize_to_wire_form() {
        let ev = InboundEvent::Typing {
            user_id: "u1".into(),
            username: "alice".into(),
            typing: false,
        };
        let wire = serde_json::to_value(&ev).unwrap();
        assert_eq!(
            wire,
            json!({"type": "typing_indicator", "user_id": "u1", "username": "alice", "typing": false})
        );
        assert_eq!(ev.kind(), "typing_indicator");
    }
}
