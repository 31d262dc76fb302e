mod input;
mod render;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use campuslink_realtime::{ChannelConfig, ChannelSlot, InboundEvent, UserIdentity, WsConnector};

use crate::input::Input;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they don't interleave with chat lines
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campuslink_chat=info,campuslink_realtime=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Config
    let config = ChannelConfig::from_env()?;
    let conversation_id = std::env::args()
        .nth(1)
        .context("usage: campuslink-chat <conversation-id>")?;
    let user = match (
        std::env::var("CAMPUSLINK_USER_ID"),
        std::env::var("CAMPUSLINK_USERNAME"),
    ) {
        (Ok(id), Ok(username)) => UserIdentity::new(id, username),
        _ => bail!("CAMPUSLINK_USER_ID and CAMPUSLINK_USERNAME must be set to open a chat channel"),
    };

    let mut slot = ChannelSlot::new(config, WsConnector, |conversation_id: &str, _user: &UserIdentity| {
        let conversation_id = conversation_id.to_string();
        move |event: InboundEvent| println!("{}", render::render(&conversation_id, &event))
    });
    slot.bind(Some(&conversation_id), Some(&user)).await?;
    eprintln!("joined {} as {}; /quit to leave", conversation_id, user.username);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match input::parse(&line) {
                    Input::Empty => {}
                    Input::Send(cmd) => {
                        let sent = slot.session().is_some_and(|session| session.send(cmd));
                        if !sent {
                            warn!("not connected, message dropped");
                        }
                    }
                    Input::Join(next) => {
                        slot.bind(Some(&next), Some(&user)).await?;
                        eprintln!("joined {}", next);
                    }
                    Input::Quit => break,
                    Input::Invalid(help) => eprintln!("{}", help),
                }
            }
        }
    }

    slot.unbind().await;
    Ok(())
}
