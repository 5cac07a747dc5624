//! # parley-shared
//!
//! Types shared by every parley crate: entity identifiers, bus topic keys,
//! the JSON wire vocabulary of the chat event stream, and the REST payload
//! shapes consumed by the stores.

pub mod constants;
pub mod error;
pub mod payloads;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use types::{ChannelId, MessageId, StagedId, ThreadId, Topic, UserId};
