//! REST payload shapes exchanged with the chat API.
//!
//! These mirror the JSON the server renders for channels, threads and
//! memberships. Store models are built from them; they are never mutated in
//! place.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{
    ChannelId, ChannelKind, ChannelStatus, MessageId, NotificationLevel, StagedId, ThreadId, UserId,
};

/// The current user's membership in a channel or thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MembershipPayload {
    #[serde(default)]
    pub following: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub notification_level: NotificationLevel,
    #[serde(default)]
    pub last_read_message_id: Option<MessageId>,
    #[serde(default)]
    pub last_viewed_at: Option<DateTime<Utc>>,
}

/// Raw counters as sent by the server. Signed so that a misbehaving server
/// cannot make deserialization fail; stores clamp them at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingCounts {
    #[serde(default)]
    pub unread_count: i64,
    #[serde(default)]
    pub mention_count: i64,
    #[serde(default)]
    pub watched_threads_unread_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessagePayload {
    pub id: MessageId,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBusLastIds {
    #[serde(default)]
    pub channel_message_bus_last_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelMeta {
    #[serde(default)]
    pub message_bus_last_ids: MessageBusLastIds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPayload {
    pub id: ChannelId,
    pub kind: ChannelKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ChannelStatus,
    #[serde(default)]
    pub threading_enabled: bool,
    #[serde(default)]
    pub memberships_count: u32,
    #[serde(default)]
    pub current_user_membership: MembershipPayload,
    #[serde(default)]
    pub last_message: Option<LastMessagePayload>,
    #[serde(default)]
    pub meta: ChannelMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadPayload {
    pub id: ThreadId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub current_user_membership: Option<MembershipPayload>,
    #[serde(default)]
    pub original_message_id: Option<MessageId>,
    #[serde(default)]
    pub last_message_id: Option<MessageId>,
    #[serde(default)]
    pub reply_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadTrackingPayload {
    pub channel_id: ChannelId,
    #[serde(flatten)]
    pub counts: TrackingCounts,
}

/// Bulk tracking state, keyed by entity id. Used both by the bootstrap
/// response and by the `bulk_tracking_state` user-state event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    #[serde(default, deserialize_with = "id_keyed")]
    pub channel_tracking: HashMap<ChannelId, TrackingCounts>,
    #[serde(default, deserialize_with = "id_keyed")]
    pub thread_tracking: HashMap<ThreadId, ThreadTrackingPayload>,
}

/// JSON object keys are always strings. Inside an internally tagged event
/// serde hands them over as plain strings rather than through the map-key
/// deserializer, so ids are parsed here.
fn id_keyed<'de, D, K, V>(deserializer: D) -> Result<HashMap<K, V>, D::Error>
where
    D: Deserializer<'de>,
    K: FromStr + Eq + Hash,
    K::Err: Display,
    V: Deserialize<'de>,
{
    HashMap::<String, V>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, value)| {
            key.parse::<K>()
                .map(|id| (id, value))
                .map_err(|e| D::Error::custom(format!("invalid id key {key:?}: {e}")))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStateMeta {
    #[serde(default)]
    pub user_state_last_id: Option<i64>,
}

/// Response of "list my channels": everything the bootstrap path needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MyChannelsResponse {
    #[serde(default)]
    pub public_channels: Vec<ChannelPayload>,
    #[serde(default)]
    pub direct_message_channels: Vec<ChannelPayload>,
    #[serde(default)]
    pub tracking: TrackingSnapshot,
    #[serde(default)]
    pub meta: UserStateMeta,
}

/// Body posted when the local user composes a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
    pub staged_id: StagedId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<MessageId>,
    #[serde(default)]
    pub upload_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub message_id: Option<MessageId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_payload_defaults_missing_fields() {
        let json = r#"{"id": 4, "kind": "direct_message"}"#;
        let payload: ChannelPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.id, ChannelId(4));
        assert_eq!(payload.status, ChannelStatus::Open);
        assert!(!payload.current_user_membership.following);
        assert!(payload.meta.message_bus_last_ids.channel_message_bus_last_id.is_none());
    }

    #[test]
    fn tracking_snapshot_accepts_string_keys() {
        let json = r#"{
            "channel_tracking": {"1": {"unread_count": 3, "mention_count": 1}},
            "thread_tracking": {"9": {"channel_id": 1, "unread_count": 2}}
        }"#;
        let snapshot: TrackingSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.channel_tracking[&ChannelId(1)].unread_count, 3);
        let thread = snapshot.thread_tracking[&ThreadId(9)];
        assert_eq!(thread.channel_id, ChannelId(1));
        assert_eq!(thread.counts.unread_count, 2);
        assert_eq!(thread.counts.watched_threads_unread_count, 0);
    }
}
