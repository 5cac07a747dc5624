//! Channel and thread entities held by the stores.
//!
//! Entities are built from REST payloads and then mutated only by the bus
//! handlers, through the `&mut` references the stores hand out.

use chrono::{DateTime, Utc};
use serde::Serialize;

use parley_shared::payloads::{
    ChannelPayload, LastMessagePayload, MembershipPayload, ThreadPayload, TrackingCounts,
};
use parley_shared::types::{ChannelKind, ChannelStatus, NotificationLevel};
use parley_shared::{ChannelId, MessageId, StagedId, ThreadId, Topic, UserId};

use crate::messages::{Message, MessageList};
use crate::threads::ThreadStore;

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// The current user's membership in a channel or thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Membership {
    pub following: bool,
    pub muted: bool,
    pub starred: bool,
    pub notification_level: NotificationLevel,
    pub last_read_message_id: Option<MessageId>,
    pub last_viewed_at: Option<DateTime<Utc>>,
}

impl From<MembershipPayload> for Membership {
    fn from(p: MembershipPayload) -> Self {
        Self {
            following: p.following,
            muted: p.muted,
            starred: p.starred,
            notification_level: p.notification_level,
            last_read_message_id: p.last_read_message_id,
            last_viewed_at: p.last_viewed_at,
        }
    }
}

impl Membership {
    /// Quiet and muted memberships never accumulate unread counts.
    pub fn is_quiet(&self) -> bool {
        self.muted
            || matches!(
                self.notification_level,
                NotificationLevel::Quiet | NotificationLevel::Muted
            )
    }

    pub fn is_watching(&self) -> bool {
        self.notification_level == NotificationLevel::Watching
    }

    /// Whether `message_id` is at or below the read marker.
    pub fn has_read(&self, message_id: MessageId) -> bool {
        self.last_read_message_id
            .is_some_and(|last| message_id <= last)
    }

    /// Move the read marker forward. Never moves it backwards.
    pub fn advance_read(&mut self, message_id: MessageId) {
        if !self.has_read(message_id) {
            self.last_read_message_id = Some(message_id);
        }
    }
}

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

/// Which tracking counter an increment or decrement targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Unread,
    Mention,
    WatchedThreadsUnread,
}

/// Server-authoritative unread/mention counters of one channel or thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tracking {
    pub unread_count: u32,
    pub mention_count: u32,
    pub watched_threads_unread_count: u32,
}

fn clamp_count(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

impl Tracking {
    pub fn from_counts(counts: &TrackingCounts) -> Self {
        Self {
            unread_count: clamp_count(counts.unread_count),
            mention_count: clamp_count(counts.mention_count),
            watched_threads_unread_count: clamp_count(counts.watched_threads_unread_count),
        }
    }

    /// Overwrite every counter with the server's values.
    pub fn set(&mut self, counts: &TrackingCounts) {
        *self = Self::from_counts(counts);
    }

    fn counter_mut(&mut self, counter: Counter) -> &mut u32 {
        match counter {
            Counter::Unread => &mut self.unread_count,
            Counter::Mention => &mut self.mention_count,
            Counter::WatchedThreadsUnread => &mut self.watched_threads_unread_count,
        }
    }

    pub fn increment(&mut self, counter: Counter) {
        let value = self.counter_mut(counter);
        *value = value.saturating_add(1);
    }

    /// Decrement, clamping at zero.
    pub fn decrement(&mut self, counter: Counter) {
        let value = self.counter_mut(counter);
        *value = value.saturating_sub(1);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastMessage {
    pub id: MessageId,
    pub created_at: DateTime<Utc>,
    pub author_id: UserId,
}

impl From<LastMessagePayload> for LastMessage {
    fn from(p: LastMessagePayload) -> Self {
        Self {
            id: p.id,
            created_at: p.created_at,
            author_id: p.user_id,
        }
    }
}

/// A cached chat channel (category channel or direct-message channel).
#[derive(Debug)]
pub struct Channel {
    pub id: ChannelId,
    pub kind: ChannelKind,
    pub title: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub status: ChannelStatus,
    pub threading_enabled: bool,
    pub memberships_count: u32,
    pub membership: Membership,
    pub tracking: Tracking,
    /// Thread replies from others since the channel was last viewed.
    pub unread_threads_since_last_viewed: u32,
    pub last_message: Option<LastMessage>,
    /// Resume cursor of the `channel:{id}` topic.
    pub last_seen_sequence_id: Option<i64>,
    threads: ThreadStore,
    messages: MessageList,
}

impl Channel {
    pub fn from_payload(payload: ChannelPayload) -> Self {
        Self {
            id: payload.id,
            kind: payload.kind,
            title: payload.title,
            slug: payload.slug,
            description: payload.description,
            status: payload.status,
            threading_enabled: payload.threading_enabled,
            memberships_count: payload.memberships_count,
            membership: payload.current_user_membership.into(),
            tracking: Tracking::default(),
            unread_threads_since_last_viewed: 0,
            last_message: payload.last_message.map(LastMessage::from),
            last_seen_sequence_id: payload.meta.message_bus_last_ids.channel_message_bus_last_id,
            threads: ThreadStore::new(payload.id),
            messages: MessageList::new(),
        }
    }

    pub fn topic(&self) -> Topic {
        self.id.to_topic()
    }

    pub fn is_direct_message(&self) -> bool {
        self.kind == ChannelKind::DirectMessage
    }

    pub fn is_category(&self) -> bool {
        self.kind == ChannelKind::Category
    }

    /// The name used for alphabetical ordering: the slug when present,
    /// otherwise the title, lowercased.
    pub fn sort_name(&self) -> String {
        self.slug.as_deref().unwrap_or(&self.title).to_lowercase()
    }

    pub fn threads(&self) -> &ThreadStore {
        &self.threads
    }

    pub fn threads_mut(&mut self) -> &mut ThreadStore {
        &mut self.threads
    }

    pub fn messages(&self) -> &MessageList {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageList {
        &mut self.messages
    }

    /// The list a message of `thread_id` belongs in: the cached thread's
    /// list, or the channel's own list otherwise.
    pub fn message_list_mut(&mut self, thread_id: Option<ThreadId>) -> &mut MessageList {
        match thread_id.and_then(|id| self.threads.get_mut(id)) {
            Some(thread) => thread.messages_mut(),
            None => &mut self.messages,
        }
    }

    /// Find a confirmed message in the channel list or any cached thread.
    pub fn find_message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        if let Some(message) = self.messages.get_mut(id) {
            return Some(message);
        }
        self.threads
            .iter_mut()
            .find_map(|thread| thread.messages_mut().get_mut(id))
    }

    /// Like [`Channel::find_message_mut`], but searches `thread_id` first.
    pub fn find_message_in_mut(
        &mut self,
        thread_id: Option<ThreadId>,
        id: MessageId,
    ) -> Option<&mut Message> {
        let in_thread = thread_id
            .and_then(|t| self.threads.get(t))
            .is_some_and(|thread| thread.messages().get(id).is_some());
        if in_thread {
            return thread_id
                .and_then(|t| self.threads.get_mut(t))
                .and_then(|thread| thread.messages_mut().get_mut(id));
        }
        self.find_message_mut(id)
    }

    /// Find a staged echo in the channel list or any cached thread.
    pub fn find_staged_mut(&mut self, staged_id: &StagedId) -> Option<&mut Message> {
        if let Some(message) = self.messages.find_staged_mut(staged_id) {
            return Some(message);
        }
        self.threads
            .iter_mut()
            .find_map(|thread| thread.messages_mut().find_staged_mut(staged_id))
    }

    /// Move the staged echo `staged_id` into the list `thread_id` selects
    /// (see [`Channel::message_list_mut`]), wherever it was staged. Returns
    /// false when no such echo exists in the channel.
    pub fn relocate_staged(
        &mut self,
        staged_id: &StagedId,
        thread_id: Option<ThreadId>,
    ) -> bool {
        if self.message_list_mut(thread_id).find_staged(staged_id).is_some() {
            return true;
        }
        let taken = self.messages.remove_staged(staged_id).or_else(|| {
            self.threads
                .iter_mut()
                .find_map(|thread| thread.messages_mut().remove_staged(staged_id))
        });
        match taken {
            Some(echo) => self.message_list_mut(thread_id).push(echo),
            None => false,
        }
    }

    /// Record a new top-level message for `last_message` ordering.
    pub fn touch_last_message(
        &mut self,
        id: MessageId,
        created_at: DateTime<Utc>,
        author_id: UserId,
    ) {
        let newer = self.last_message.as_ref().map_or(true, |last| id > last.id);
        if newer {
            self.last_message = Some(LastMessage {
                id,
                created_at,
                author_id,
            });
        }
    }

    /// Mark everything up to `message_id` as read locally.
    pub fn mark_read(&mut self, message_id: MessageId) {
        self.membership.advance_read(message_id);
        self.membership.last_viewed_at = Some(Utc::now());
        self.tracking.unread_count = 0;
        self.tracking.mention_count = 0;
        self.unread_threads_since_last_viewed = 0;
    }
}

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

/// Outcome of recording a new message on a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadActivity {
    /// Authored by the current user; the read marker moved.
    Read,
    /// Already at or below the read marker.
    AlreadyRead,
    /// No membership, or a quiet/muted one; counters untouched.
    Suppressed,
    /// Counted in `unread_count`.
    Unread,
    /// Counted in `watched_threads_unread_count`.
    WatchedUnread,
}

impl ThreadActivity {
    pub fn is_unread(self) -> bool {
        matches!(self, ThreadActivity::Unread | ThreadActivity::WatchedUnread)
    }
}

#[derive(Debug)]
pub struct Thread {
    pub id: ThreadId,
    pub channel_id: ChannelId,
    pub title: Option<String>,
    pub membership: Option<Membership>,
    pub tracking: Tracking,
    pub original_message_id: Option<MessageId>,
    pub last_message_id: Option<MessageId>,
    pub reply_count: u32,
    messages: MessageList,
}

impl Thread {
    pub fn from_payload(payload: ThreadPayload) -> Self {
        Self {
            id: payload.id,
            channel_id: payload.channel_id,
            title: payload.title,
            membership: payload.current_user_membership.map(Membership::from),
            tracking: Tracking::default(),
            original_message_id: payload.original_message_id,
            last_message_id: payload.last_message_id,
            reply_count: payload.reply_count,
            messages: MessageList::new(),
        }
    }

    pub fn topic(&self) -> Topic {
        Topic::Thread(self.channel_id, self.id)
    }

    pub fn messages(&self) -> &MessageList {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageList {
        &mut self.messages
    }

    /// Apply a new reply to the thread's counters.
    ///
    /// Quiet threads are never incremented; watched threads count into
    /// `watched_threads_unread_count` instead of `unread_count`.
    pub fn record_new_message(
        &mut self,
        message_id: MessageId,
        from_current_user: bool,
    ) -> ThreadActivity {
        if self.last_message_id.map_or(true, |last| message_id > last) {
            self.last_message_id = Some(message_id);
            if Some(message_id) != self.original_message_id {
                self.reply_count = self.reply_count.saturating_add(1);
            }
        }

        let Some(membership) = self.membership.as_mut() else {
            return ThreadActivity::Suppressed;
        };

        if from_current_user {
            membership.advance_read(message_id);
            return ThreadActivity::Read;
        }
        if membership.has_read(message_id) {
            return ThreadActivity::AlreadyRead;
        }
        if membership.is_quiet() {
            return ThreadActivity::Suppressed;
        }
        if membership.is_watching() {
            self.tracking.increment(Counter::WatchedThreadsUnread);
            ThreadActivity::WatchedUnread
        } else {
            self.tracking.increment(Counter::Unread);
            ThreadActivity::Unread
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread_with(level: Option<NotificationLevel>) -> Thread {
        Thread::from_payload(ThreadPayload {
            id: ThreadId(1),
            channel_id: ChannelId(1),
            title: None,
            current_user_membership: level.map(|notification_level| MembershipPayload {
                notification_level,
                ..Default::default()
            }),
            original_message_id: Some(MessageId(10)),
            last_message_id: Some(MessageId(10)),
            reply_count: 0,
        })
    }

    #[test]
    fn decrement_clamps_at_zero() {
        let mut tracking = Tracking::default();
        tracking.decrement(Counter::Unread);
        tracking.decrement(Counter::Mention);
        assert_eq!(tracking, Tracking::default());

        tracking.increment(Counter::Unread);
        tracking.decrement(Counter::Unread);
        tracking.decrement(Counter::Unread);
        assert_eq!(tracking.unread_count, 0);
    }

    #[test]
    fn negative_server_counts_clamp_to_zero() {
        let tracking = Tracking::from_counts(&TrackingCounts {
            unread_count: -4,
            mention_count: 2,
            watched_threads_unread_count: -1,
        });
        assert_eq!(tracking.unread_count, 0);
        assert_eq!(tracking.mention_count, 2);
        assert_eq!(tracking.watched_threads_unread_count, 0);
    }

    #[test]
    fn quiet_thread_is_not_incremented() {
        let mut thread = thread_with(Some(NotificationLevel::Quiet));
        let activity = thread.record_new_message(MessageId(11), false);
        assert_eq!(activity, ThreadActivity::Suppressed);
        assert_eq!(thread.tracking.unread_count, 0);
        assert_eq!(thread.reply_count, 1);
    }

    #[test]
    fn watched_thread_counts_into_watched_bucket() {
        let mut thread = thread_with(Some(NotificationLevel::Watching));
        assert_eq!(
            thread.record_new_message(MessageId(11), false),
            ThreadActivity::WatchedUnread
        );
        assert_eq!(thread.tracking.watched_threads_unread_count, 1);
        assert_eq!(thread.tracking.unread_count, 0);
    }

    #[test]
    fn tracking_thread_counts_unread_once_per_unread_message() {
        let mut thread = thread_with(Some(NotificationLevel::Tracking));
        assert_eq!(
            thread.record_new_message(MessageId(11), true),
            ThreadActivity::Read
        );
        assert_eq!(
            thread.record_new_message(MessageId(11), false),
            ThreadActivity::AlreadyRead
        );
        assert_eq!(
            thread.record_new_message(MessageId(12), false),
            ThreadActivity::Unread
        );
        assert_eq!(thread.tracking.unread_count, 1);
    }

    #[test]
    fn thread_without_membership_is_suppressed() {
        let mut thread = thread_with(None);
        assert_eq!(
            thread.record_new_message(MessageId(11), false),
            ThreadActivity::Suppressed
        );
        assert!(thread.tracking.is_empty());
    }

    #[test]
    fn thread_messages_are_found_from_the_channel() {
        let mut channel = Channel::from_payload(crate::testing::category_channel(1, "general"));
        channel
            .threads_mut()
            .store(crate::testing::thread_payload(1, 7, None));

        let staged = StagedId::from("abc");
        let echo = Message::staged(staged.clone(), ChannelId(1), UserId(1), "hi".into());
        assert!(channel.message_list_mut(Some(ThreadId(7))).push(echo));
        assert!(channel.messages().is_empty());
        assert!(channel.find_staged_mut(&staged).is_some());

        // Unknown threads fall back to the channel list.
        let echo = Message::staged(StagedId::from("def"), ChannelId(1), UserId(1), "yo".into());
        assert!(channel.message_list_mut(Some(ThreadId(99))).push(echo));
        assert_eq!(channel.messages().len(), 1);
        assert!(channel.find_message_in_mut(Some(ThreadId(7)), MessageId(5)).is_none());
    }

    #[test]
    fn staged_echo_follows_its_thread_once_cached() {
        let mut channel = Channel::from_payload(crate::testing::category_channel(1, "general"));
        let staged = StagedId::from("abc");
        let echo = Message::staged(staged.clone(), ChannelId(1), UserId(1), "hi".into());
        // Thread 7 is not cached yet, so the echo lands in the channel list.
        assert!(channel.message_list_mut(Some(ThreadId(7))).push(echo));

        channel
            .threads_mut()
            .store(crate::testing::thread_payload(1, 7, None));
        assert!(channel.relocate_staged(&staged, Some(ThreadId(7))));
        assert!(channel.messages().is_empty());
        let thread = channel.threads().get(ThreadId(7)).unwrap();
        assert!(thread.messages().find_staged(&staged).is_some());

        // Already in place: nothing moves.
        assert!(channel.relocate_staged(&staged, Some(ThreadId(7))));
        assert!(!channel.relocate_staged(&StagedId::from("zzz"), None));
    }

    #[test]
    fn read_marker_never_moves_backwards() {
        let mut membership = Membership::default();
        membership.advance_read(MessageId(5));
        membership.advance_read(MessageId(3));
        assert_eq!(membership.last_read_message_id, Some(MessageId(5)));
        assert!(membership.has_read(MessageId(4)));
        assert!(!membership.has_read(MessageId(6)));
    }
}
