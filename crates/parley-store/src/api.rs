//! The REST collaborator contract.
//!
//! Stores only know this trait; the HTTP implementation lives in
//! `parley-client` and tests use the in-memory fake from [`crate::testing`].

use async_trait::async_trait;
use thiserror::Error;

use parley_shared::payloads::{
    ChannelPayload, MembershipPayload, MyChannelsResponse, SendMessageRequest, SendMessageResponse,
    ThreadPayload,
};
use parley_shared::{ChannelId, MessageId, ThreadId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Resource not found")]
    NotFound,

    #[error("Request rejected with HTTP status {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Response decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelPayload, ApiError>;

    async fn fetch_thread(
        &self,
        channel_id: ChannelId,
        thread_id: ThreadId,
    ) -> Result<ThreadPayload, ApiError>;

    /// The current user's channels with bulk tracking and resume cursors.
    async fn list_my_channels(&self) -> Result<MyChannelsResponse, ApiError>;

    async fn follow_channel(&self, channel_id: ChannelId) -> Result<MembershipPayload, ApiError>;

    async fn unfollow_channel(&self, channel_id: ChannelId)
        -> Result<MembershipPayload, ApiError>;

    async fn mark_read(&self, channel_id: ChannelId, message_id: MessageId)
        -> Result<(), ApiError>;

    async fn send_message(
        &self,
        channel_id: ChannelId,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError>;
}
