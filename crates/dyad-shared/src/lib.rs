//! # dyad-shared
//!
//! Wire protocol and identifier types shared between the Dyad server, its
//! persistence layer, and clients.
//!
//! Everything that crosses the WebSocket or HTTP boundary lives here: the
//! closed set of inbound/outbound realtime events, the outward-facing view
//! structs (which never carry a password hash), and the deterministic
//! conversation-id derivation.

pub mod protocol;
pub mod types;

mod error;

pub use error::ProtocolError;
pub use protocol::*;
pub use types::{ConversationId, Presence, UserId};
