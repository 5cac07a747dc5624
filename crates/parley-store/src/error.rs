use parley_shared::{ChannelId, ThreadId};
use thiserror::Error;

use crate::api::ApiError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The REST collaborator rejected or failed the request.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// An operation needed a cached channel that is not in the store.
    #[error("Channel {0} is not cached")]
    ChannelNotCached(ChannelId),

    /// An operation needed a cached thread that is not in its channel's store.
    #[error("Thread {thread} is not cached in channel {channel}")]
    ThreadNotCached { channel: ChannelId, thread: ThreadId },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
