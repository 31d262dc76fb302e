use std::sync::Arc;

use tracing::debug;

use campuslink_types::UserIdentity;

use crate::config::ChannelConfig;
use crate::error::Result;
use crate::session::{ChannelSession, ConnectionState, EventHandler};
use crate::transport::Connector;

/// Owns at most one [`ChannelSession`] for a view that follows a
/// (conversation, user) pair over time.
///
/// Rebinding to a different pair shuts the old session down completely
/// before the new one is opened, so two transports never overlap.
pub struct ChannelSlot<C, F> {
    config: ChannelConfig,
    connector: Arc<C>,
    make_handler: F,
    session: Option<ChannelSession>,
}

impl<C, F, H> ChannelSlot<C, F>
where
    C: Connector,
    F: FnMut(&str, &UserIdentity) -> H,
    H: EventHandler,
{
    /// `make_handler` is called once per opened session with the
    /// conversation id and user it is opened for.
    pub fn new(config: ChannelConfig, connector: C, make_handler: F) -> Self {
        Self {
            config,
            connector: Arc::new(connector),
            make_handler,
            session: None,
        }
    }

    /// Follow a new (conversation, user) pair. `None` for either side
    /// leaves the slot empty. Binding the pair that is already live is a
    /// no-op.
    pub async fn bind(
        &mut self,
        conversation_id: Option<&str>,
        user: Option<&UserIdentity>,
    ) -> Result<()> {
        if let Some(current) = &self.session {
            let same_pair =
                Some(current.conversation_id()) == conversation_id && Some(current.user()) == user;
            if same_pair && current.state() != ConnectionState::Closed {
                return Ok(());
            }
        }

        self.unbind().await;

        let (Some(conversation_id), Some(user)) = (conversation_id, user) else {
            debug!("chat slot left unbound");
            return Ok(());
        };

        let handler = (self.make_handler)(conversation_id, user);
        let session = ChannelSession::open(
            &self.config,
            self.connector.clone(),
            conversation_id,
            user.clone(),
            handler,
        )?;
        self.session = Some(session);
        Ok(())
    }

    /// Shut down the current session, if any, and wait for its transport
    /// to be released.
    pub async fn unbind(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown().await;
        }
    }

    pub fn session(&self) -> Option<&ChannelSession> {
        self.session.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        self.session
            .as_ref()
            .map_or(ConnectionState::Idle, ChannelSession::state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}
