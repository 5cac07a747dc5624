//! Bus wire protocol.
//!
//! Every event arrives wrapped in a [`BusEnvelope`] carrying its topic and
//! per-topic sequence id. The JSON payload is tagged by a `type` field and
//! decodes into [`ChannelEvent`] (channel and thread topics) or
//! [`UserStateEvent`] (the user-state topic). Tags this client does not know
//! decode to the `Unknown` variant and are ignored downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::payloads::{ChannelPayload, TrackingCounts, TrackingSnapshot};
use crate::types::{
    ChannelId, ChannelStatus, MessageId, ReactionAction, StagedId, ThreadId, Topic, UserId,
};

/// One event as handed over by the bus transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEnvelope {
    pub topic: Topic,
    pub sequence_id: i64,
    pub payload: serde_json::Value,
}

impl BusEnvelope {
    /// The `type` tag of the payload, if any.
    pub fn type_tag(&self) -> Option<&str> {
        self.payload.get("type").and_then(|t| t.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
}

/// A server-rendered chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: MessageId,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
    #[serde(default)]
    pub in_reply_to_id: Option<MessageId>,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub cooked: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_by_id: Option<UserId>,
    #[serde(default)]
    pub upload_ids: Vec<u64>,
}

impl MessagePayload {
    pub fn author_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }
}

/// The re-rendered part of a message (`processed`, `refresh`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedPayload {
    pub id: MessageId,
    #[serde(default)]
    pub cooked: String,
    #[serde(default)]
    pub excerpt: Option<String>,
}

/// Events published on `channel:{id}` and `channel:{id}:thread:{thread_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    Sent {
        chat_message: MessagePayload,
        #[serde(default)]
        staged_id: Option<StagedId>,
    },
    Reaction {
        chat_message_id: MessageId,
        emoji: String,
        action: ReactionAction,
        user: UserRef,
    },
    Processed {
        chat_message: RenderedPayload,
    },
    Edit {
        chat_message: MessagePayload,
    },
    Refresh {
        chat_message: RenderedPayload,
    },
    Delete {
        deleted_id: MessageId,
        #[serde(default)]
        deleted_at: Option<DateTime<Utc>>,
        #[serde(default)]
        deleted_by_id: Option<UserId>,
    },
    BulkDelete {
        deleted_ids: Vec<MessageId>,
        #[serde(default)]
        deleted_at: Option<DateTime<Utc>>,
    },
    Restore {
        chat_message: MessagePayload,
    },
    MentionWarning {
        chat_message_id: MessageId,
        #[serde(default)]
        cannot_see: Vec<UserId>,
        #[serde(default)]
        without_membership: Vec<UserId>,
        #[serde(default)]
        groups_with_too_many_members: Vec<String>,
        #[serde(default)]
        group_mentions_disabled: Vec<String>,
    },
    SelfFlagged {
        chat_message_id: MessageId,
        user_flag_status: i32,
    },
    Flag {
        chat_message_id: MessageId,
        reviewable_id: u64,
    },
    ThreadCreated {
        chat_message_id: MessageId,
        thread_id: ThreadId,
    },
    UpdateThreadOriginalMessage {
        thread_id: ThreadId,
        original_message: RenderedPayload,
        #[serde(default)]
        reply_count: Option<u32>,
        #[serde(default)]
        last_reply_id: Option<MessageId>,
    },
    #[serde(other)]
    Unknown,
}

impl ChannelEvent {
    pub fn decode(payload: &serde_json::Value) -> Result<Self, ProtocolError> {
        Ok(Self::deserialize(payload)?)
    }
}

/// Incremental tracking update for one channel, optionally one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingDelta {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
    #[serde(flatten)]
    pub counts: TrackingCounts,
    #[serde(default)]
    pub thread_tracking: Option<TrackingCounts>,
}

/// Events published on `user-state:{user_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserStateEvent {
    TrackingState(TrackingDelta),
    BulkTrackingState(TrackingSnapshot),
    HasThreads {
        has_threads: bool,
    },
    NewMentions {
        channel_id: ChannelId,
        message_id: MessageId,
        #[serde(default)]
        thread_id: Option<ThreadId>,
    },
    Kick {
        channel_id: ChannelId,
    },
    NewChannel {
        channel: ChannelPayload,
    },
    Notice {
        channel_id: ChannelId,
        text_content: String,
    },
    SelfFlagged {
        channel_id: ChannelId,
        chat_message_id: MessageId,
        user_flag_status: i32,
    },
    ChannelStatus {
        channel_id: ChannelId,
        status: ChannelStatus,
    },
    ChannelEdits {
        channel_id: ChannelId,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        slug: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    ChannelMetadata {
        channel_id: ChannelId,
        memberships_count: u32,
    },
    #[serde(other)]
    Unknown,
}

impl UserStateEvent {
    pub fn decode(payload: &serde_json::Value) -> Result<Self, ProtocolError> {
        Ok(Self::deserialize(payload)?)
    }
}
