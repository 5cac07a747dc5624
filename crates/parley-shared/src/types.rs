use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{CHANNEL_TOPIC_PREFIX, THREAD_TOPIC_INFIX, USER_STATE_TOPIC_PREFIX};
use crate::error::ProtocolError;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

numeric_id!(
    /// Server identity of a chat user.
    UserId
);
numeric_id!(
    /// Server identity of a chat channel.
    ChannelId
);
numeric_id!(
    /// Server identity of a thread inside a channel.
    ThreadId
);
numeric_id!(
    /// Server identity of a confirmed message.
    MessageId
);

impl ChannelId {
    pub fn to_topic(self) -> Topic {
        Topic::Channel(self)
    }
}

impl UserId {
    pub fn to_topic(self) -> Topic {
        Topic::UserState(self)
    }
}

/// Client-generated identity of a message that the server has not
/// acknowledged yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct StagedId(pub String);

impl StagedId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for StagedId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for StagedId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for StagedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// Key of one ordered event stream on the bus.
///
/// Rendered as `channel:{id}`, `channel:{id}:thread:{thread_id}` or
/// `user-state:{user_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    Channel(ChannelId),
    Thread(ChannelId, ThreadId),
    UserState(UserId),
}

impl Topic {
    /// The channel a channel or thread topic belongs to.
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            Topic::Channel(id) | Topic::Thread(id, _) => Some(*id),
            Topic::UserState(_) => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Channel(id) => write!(f, "{CHANNEL_TOPIC_PREFIX}{id}"),
            Topic::Thread(id, thread) => {
                write!(f, "{CHANNEL_TOPIC_PREFIX}{id}{THREAD_TOPIC_INFIX}{thread}")
            }
            Topic::UserState(user) => write!(f, "{USER_STATE_TOPIC_PREFIX}{user}"),
        }
    }
}

impl FromStr for Topic {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidTopic(s.to_string());

        if let Some(rest) = s.strip_prefix(USER_STATE_TOPIC_PREFIX) {
            return rest.parse().map(Topic::UserState).map_err(|_| invalid());
        }

        let rest = s.strip_prefix(CHANNEL_TOPIC_PREFIX).ok_or_else(invalid)?;
        match rest.split_once(THREAD_TOPIC_INFIX) {
            Some((channel, thread)) => Ok(Topic::Thread(
                channel.parse().map_err(|_| invalid())?,
                thread.parse().map_err(|_| invalid())?,
            )),
            None => rest.parse().map(Topic::Channel).map_err(|_| invalid()),
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

// ---------------------------------------------------------------------------
// Enumerations shared by payloads and models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Category,
    DirectMessage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    #[default]
    Open,
    ReadOnly,
    Closed,
    Archived,
}

/// Per-membership notification level. `Quiet` and `Muted` memberships do not
/// accumulate unread counts from new messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Muted,
    Quiet,
    #[default]
    Tracking,
    Watching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Add,
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_display_and_parse_agree() {
        let topics = [
            Topic::Channel(ChannelId(7)),
            Topic::Thread(ChannelId(7), ThreadId(42)),
            Topic::UserState(UserId(3)),
        ];
        for topic in topics {
            let parsed: Topic = topic.to_string().parse().unwrap();
            assert_eq!(parsed, topic);
        }
        assert_eq!(ChannelId(7).to_topic().to_string(), "channel:7");
        assert_eq!(
            Topic::Thread(ChannelId(7), ThreadId(42)).to_string(),
            "channel:7:thread:42"
        );
    }

    #[test]
    fn malformed_topics_are_rejected() {
        for bad in ["", "channel:", "channel:x", "user-state:", "channel:1:thread:", "presence:1"] {
            assert!(bad.parse::<Topic>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn topic_serializes_as_string() {
        let json = serde_json::to_string(&Topic::UserState(UserId(9))).unwrap();
        assert_eq!(json, "\"user-state:9\"");
        let back: Topic = serde_json::from_str("\"channel:1:thread:2\"").unwrap();
        assert_eq!(back, Topic::Thread(ChannelId(1), ThreadId(2)));
    }

    #[test]
    fn staged_ids_are_unique() {
        assert_ne!(StagedId::new(), StagedId::new());
    }
}
