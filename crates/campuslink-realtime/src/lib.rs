//! Realtime channel client for CampusLink conversations.
//!
//! One [`ChannelSession`] keeps a WebSocket bound to a single
//! conversation, decodes inbound frames into [`InboundEvent`]s for the
//! caller's handler, and reconnects on a fixed delay whenever the
//! transport closes. [`ChannelSlot`] owns the session lifecycle for a
//! view that switches conversations or users.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod session;
pub mod slot;
pub mod transport;

pub use campuslink_types::{InboundEvent, OutboundCommand, UserIdentity};
pub use config::{ChannelConfig, RECONNECT_DELAY};
pub use endpoint::chat_endpoint;
pub use error::{ChannelError, Result};
pub use session::{ChannelSession, ConnectionState, EventHandler};
pub use slot::ChannelSlot;
pub use transport::{Connector, Frame, Link, WsConnector};
