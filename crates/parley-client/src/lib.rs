//! # parley-client
//!
//! The real-time synchronization core of the chat client. A [`SyncEngine`]
//! owns the channel cache and the topic subscriptions, pulls
//! [`BusEnvelope`](parley_shared::protocol::BusEnvelope)s from one queue,
//! and keeps channels, threads, messages and unread counters consistent
//! with the server's event stream.

pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;
pub mod notifications;
pub mod staged;

mod dispatch;
mod user_state;

pub use bus::{SubscriptionRegistry, TopicHandler, TransportCommand};
pub use config::ClientConfig;
pub use engine::SyncEngine;
pub use error::{ClientError, Result};
pub use http::HttpChatApi;
pub use notifications::{ClientNotification, Notifier};
pub use staged::Draft;
