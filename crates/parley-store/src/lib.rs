//! # parley-store
//!
//! In-memory client caches for the chat synchronization core.
//!
//! The [`ChannelStore`] exclusively owns every cached [`Channel`]; each
//! channel owns its [`ThreadStore`] and message list. Nothing outside this
//! crate mutates an entity except through a `&mut` handed out by a store
//! method. Lookups that miss the cache can fall back to the REST
//! collaborator described by [`ChatApi`].

pub mod api;
pub mod channels;
pub mod messages;
pub mod models;
pub mod ranking;
pub mod threads;
pub mod tracking;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

mod error;

pub use api::{ApiError, ChatApi};
pub use channels::{ChannelStore, ChannelSubscriptions, Lookup, StoreUpdate};
pub use error::{Result, StoreError};
pub use messages::{MentionWarning, Message, MessageList, Reaction};
pub use models::*;
pub use ranking::ActivityClass;
pub use threads::ThreadStore;
pub use tracking::{TrackingAggregator, TrackingTotals};
