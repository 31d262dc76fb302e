use campuslink_types::OutboundCommand;

/// One line typed at the prompt.
#[derive(Debug, PartialEq)]
pub enum Input {
    Empty,
    Send(OutboundCommand),
    Join(String),
    Quit,
    Invalid(String),
}

pub const HELP: &str = "\
commands:
  <text>                    send a message
  /typing on|off            typing indicator
  /read <message-id>        mark a message read
  /react <message-id> <e>   add a reaction
  /unreact <message-id> <e> remove a reaction
  /join <conversation-id>   switch conversation
  /quit                     leave";

pub fn parse(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Input::Send(OutboundCommand::ChatMessage {
            content: line.to_string(),
        });
    };

    let args: Vec<&str> = rest.split_whitespace().collect();
    match args.as_slice() {
        ["typing", "on"] => Input::Send(OutboundCommand::typing(true)),
        ["typing", "off"] => Input::Send(OutboundCommand::typing(false)),
        ["read", id] => Input::Send(OutboundCommand::MessageRead {
            message_id: (*id).into(),
        }),
        ["react", id, emoji] => Input::Send(OutboundCommand::AddReaction {
            message_id: (*id).into(),
            emoji: emoji.to_string(),
        }),
        ["unreact", id, emoji] => Input::Send(OutboundCommand::RemoveReaction {
            message_id: (*id).into(),
            emoji: emoji.to_string(),
        }),
        ["join", id] => Input::Join(id.to_string()),
        ["quit"] | ["exit"] => Input::Quit,
        _ => Input::Invalid(format!("unknown command: /{}\n{}", rest, HELP)),
    }
}
