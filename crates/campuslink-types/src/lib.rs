//! Wire schema shared by the CampusLink realtime client and the dev relay.

pub mod events;
pub mod models;

pub use events::{InboundEvent, InboundFrame, OutboundCommand};
pub use models::{ChatMessage, Id, Reaction, UserIdentity};
