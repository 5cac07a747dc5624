use thiserror::Error;

use parley_shared::{ChannelId, ProtocolError, StagedId};
use parley_store::{ApiError, StoreError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sending staged message {staged_id} failed: {source}")]
    SendFailed {
        staged_id: StagedId,
        #[source]
        source: ApiError,
    },

    #[error("No staged message {staged_id} in channel {channel}")]
    UnknownStagedMessage { channel: ChannelId, staged_id: StagedId },

    #[error("Staged id {0} is already in use")]
    DuplicateStagedId(StagedId),
}

pub type Result<T> = std::result::Result<T, ClientError>;
