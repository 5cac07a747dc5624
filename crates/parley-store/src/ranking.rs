//! Deterministic channel ordering for sidebar-style views.
//!
//! Channels fall into three activity classes (urgent, unread, idle). Within a
//! class, category channels tie-break alphabetically by slug (or title) and
//! direct-message channels by recency of their last message. Direct-message
//! channels that never had a message always sort last, in every view. Mixed
//! lists order by (silent, class, kind, per-kind tie-break, id), so category
//! channels precede direct messages of the same class. Every comparator ends
//! on the channel id so equal keys never depend on hash-map iteration order.

use std::cmp::Ordering;

use crate::channels::ChannelStore;
use crate::models::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActivityClass {
    Urgent,
    Unread,
    Idle,
}

/// Classify a channel for activity views.
///
/// Category channels are urgent on mentions or watched-thread unreads; in a
/// direct-message channel every unread message is urgent as well.
pub fn activity_class(channel: &Channel) -> ActivityClass {
    let t = &channel.tracking;
    let mut urgent = t.mention_count.saturating_add(t.watched_threads_unread_count);
    if channel.is_direct_message() {
        urgent = urgent.saturating_add(t.unread_count);
    }
    if urgent > 0 {
        return ActivityClass::Urgent;
    }
    if t.unread_count.saturating_add(channel.unread_threads_since_last_viewed) > 0 {
        return ActivityClass::Unread;
    }
    ActivityClass::Idle
}

/// A direct-message channel nobody has written in yet.
fn is_silent(channel: &Channel) -> bool {
    channel.is_direct_message() && channel.last_message.is_none()
}

/// Newest last message first.
fn by_recency(a: &Channel, b: &Channel) -> Ordering {
    let a_at = a.last_message.as_ref().map(|m| m.created_at);
    let b_at = b.last_message.as_ref().map(|m| m.created_at);
    b_at.cmp(&a_at)
}

fn by_name(a: &Channel, b: &Channel) -> Ordering {
    a.sort_name().cmp(&b.sort_name())
}

fn compare_category(a: &Channel, b: &Channel) -> Ordering {
    activity_class(a)
        .cmp(&activity_class(b))
        .then_with(|| by_name(a, b))
        .then_with(|| a.id.cmp(&b.id))
}

fn compare_direct_message(a: &Channel, b: &Channel) -> Ordering {
    is_silent(a)
        .cmp(&is_silent(b))
        .then_with(|| activity_class(a).cmp(&activity_class(b)))
        .then_with(|| by_recency(a, b))
        .then_with(|| by_name(a, b))
        .then_with(|| a.id.cmp(&b.id))
}

/// Comparator for lists mixing both kinds of channel.
pub fn compare_by_activity(a: &Channel, b: &Channel) -> Ordering {
    match (a.is_direct_message(), b.is_direct_message()) {
        (false, false) => compare_category(a, b),
        (true, true) => compare_direct_message(a, b),
        _ => is_silent(a)
            .cmp(&is_silent(b))
            .then_with(|| activity_class(a).cmp(&activity_class(b)))
            .then_with(|| a.is_direct_message().cmp(&b.is_direct_message())),
    }
}

impl ChannelStore {
    fn followed(&self) -> impl Iterator<Item = &Channel> {
        self.iter().filter(|c| c.membership.following)
    }

    /// Followed category channels, unordered.
    pub fn public_channels(&self) -> Vec<&Channel> {
        self.followed().filter(|c| c.is_category()).collect()
    }

    pub fn public_channels_by_activity(&self) -> Vec<&Channel> {
        let mut channels = self.public_channels();
        channels.sort_by(|a, b| compare_category(a, b));
        channels
    }

    /// Followed category channels in plain alphabetical order.
    pub fn public_channels_by_name(&self) -> Vec<&Channel> {
        let mut channels = self.public_channels();
        channels.sort_by(|a, b| by_name(a, b).then_with(|| a.id.cmp(&b.id)));
        channels
    }

    /// Followed direct-message channels, most relevant first.
    pub fn direct_message_channels(&self) -> Vec<&Channel> {
        let mut channels: Vec<&Channel> =
            self.followed().filter(|c| c.is_direct_message()).collect();
        channels.sort_by(|a, b| compare_direct_message(a, b));
        channels
    }

    pub fn starred_channels_by_activity(&self) -> Vec<&Channel> {
        let mut channels: Vec<&Channel> =
            self.followed().filter(|c| c.membership.starred).collect();
        channels.sort_by(|a, b| compare_by_activity(a, b));
        channels
    }

    /// Every followed channel: starred first, then by activity. Silent
    /// direct messages stay at the tail even when starred.
    pub fn channels_by_activity(&self) -> Vec<&Channel> {
        let mut channels: Vec<&Channel> = self.followed().collect();
        channels.sort_by(|a, b| {
            is_silent(a)
                .cmp(&is_silent(b))
                .then_with(|| b.membership.starred.cmp(&a.membership.starred))
                .then_with(|| compare_by_activity(a, b))
        });
        channels
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::models::LastMessage;
    use crate::testing::{category_channel, direct_message_channel};
    use parley_shared::{ChannelId, MessageId, UserId};

    fn ids(channels: &[&Channel]) -> Vec<u64> {
        channels.iter().map(|c| c.id.0).collect()
    }

    fn followed_store() -> ChannelStore {
        let mut store = ChannelStore::new();
        for (id, slug) in [(1, "alpha"), (2, "bravo"), (3, "charlie")] {
            let mut payload = category_channel(id, slug);
            payload.current_user_membership.following = true;
            store.store(payload);
        }
        store
    }

    #[test]
    fn starred_mentions_then_unread_then_idle() {
        let mut store = followed_store();
        // A: starred with mentions, B: idle, C: unread.
        let a = store.get_mut(ChannelId(1)).unwrap();
        a.membership.starred = true;
        a.tracking.mention_count = 2;
        store.get_mut(ChannelId(3)).unwrap().tracking.unread_count = 5;

        assert_eq!(ids(&store.channels_by_activity()), vec![1, 3, 2]);
        assert_eq!(ids(&store.public_channels_by_activity()), vec![1, 3, 2]);
    }

    #[test]
    fn ties_within_a_class_break_by_slug() {
        let mut store = followed_store();
        store.get_mut(ChannelId(3)).unwrap().tracking.mention_count = 1;
        store.get_mut(ChannelId(2)).unwrap().tracking.watched_threads_unread_count = 4;
        store.get_mut(ChannelId(1)).unwrap().unread_threads_since_last_viewed = 1;

        assert_eq!(ids(&store.public_channels_by_activity()), vec![2, 3, 1]);
        assert_eq!(ids(&store.public_channels_by_name()), vec![1, 2, 3]);
    }

    #[test]
    fn starred_first_beats_activity() {
        let mut store = followed_store();
        store.get_mut(ChannelId(1)).unwrap().tracking.mention_count = 9;
        store.get_mut(ChannelId(3)).unwrap().membership.starred = true;

        assert_eq!(ids(&store.channels_by_activity()), vec![3, 1, 2]);
        assert_eq!(ids(&store.starred_channels_by_activity()), vec![3]);
    }

    #[test]
    fn direct_messages_rank_by_urgency_then_recency() {
        let mut store = ChannelStore::new();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let dms = [
            (10, "ann", Some(1)),
            (11, "bob", Some(5)),
            (12, "cat", None),
            (13, "dan", Some(3)),
        ];
        for (id, title, minutes) in dms {
            let mut payload = direct_message_channel(id, title);
            payload.current_user_membership.following = true;
            let channel = store.store(payload);
            channel.last_message = minutes.map(|m| LastMessage {
                id: MessageId(id),
                created_at: base + Duration::minutes(m),
                author_id: UserId(2),
            });
        }
        // Any unread message in a DM is urgent.
        store.get_mut(ChannelId(10)).unwrap().tracking.unread_count = 1;
        // Even with unreads, a DM without messages stays last.
        store.get_mut(ChannelId(12)).unwrap().tracking.unread_count = 3;

        assert_eq!(ids(&store.direct_message_channels()), vec![10, 11, 13, 12]);
    }

    #[test]
    fn unfollowed_channels_are_excluded() {
        let mut store = followed_store();
        store.get_mut(ChannelId(2)).unwrap().membership.following = false;
        assert_eq!(ids(&store.channels_by_activity()), vec![1, 3]);
    }

    #[test]
    fn silent_direct_message_sorts_last_among_mixed_kinds() {
        let mut store = ChannelStore::new();
        let mut silent = direct_message_channel(1, "nobody");
        silent.last_message = None;
        for payload in [silent, direct_message_channel(2, "idle"), category_channel(3, "cat")] {
            let mut payload = payload;
            payload.current_user_membership.following = true;
            store.store(payload);
        }
        store.get_mut(ChannelId(1)).unwrap().tracking.unread_count = 3;
        store.get_mut(ChannelId(1)).unwrap().membership.starred = true;
        store.get_mut(ChannelId(3)).unwrap().tracking.unread_count = 1;

        assert_eq!(ids(&store.channels_by_activity()), vec![3, 2, 1]);
        assert_eq!(ids(&store.direct_message_channels()), vec![2, 1]);
    }

    #[test]
    fn mixed_comparator_is_a_total_order() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut channels = Vec::new();
        for (id, slug) in [(1, "zulu"), (2, "alpha"), (3, "mike")] {
            let mut channel = Channel::from_payload(category_channel(id, slug));
            channel.tracking.unread_count = (id % 2) as u32;
            channels.push(channel);
        }
        for (id, title, minutes) in [(4, "ann", Some(9)), (5, "zed", Some(1)), (6, "bob", None)] {
            let mut channel = Channel::from_payload(direct_message_channel(id, title));
            channel.last_message = minutes.map(|m| LastMessage {
                id: MessageId(id),
                created_at: base + Duration::minutes(m),
                author_id: UserId(2),
            });
            channel.tracking.unread_count = (id % 2) as u32;
            channels.push(channel);
        }

        for a in &channels {
            assert_eq!(compare_by_activity(a, a), Ordering::Equal);
            for b in &channels {
                assert_eq!(compare_by_activity(a, b), compare_by_activity(b, a).reverse());
                for c in &channels {
                    if compare_by_activity(a, b) == Ordering::Less
                        && compare_by_activity(b, c) == Ordering::Less
                    {
                        assert_eq!(compare_by_activity(a, c), Ordering::Less);
                    }
                }
            }
        }
    }

    #[test]
    fn saturated_counters_still_classify() {
        let mut direct = Channel::from_payload(direct_message_channel(2, "b"));
        direct.tracking.mention_count = u32::MAX;
        direct.tracking.watched_threads_unread_count = 1;
        direct.tracking.unread_count = u32::MAX;
        assert_eq!(activity_class(&direct), ActivityClass::Urgent);

        let mut category = Channel::from_payload(category_channel(1, "a"));
        category.tracking.unread_count = u32::MAX;
        category.unread_threads_since_last_viewed = 1;
        assert_eq!(activity_class(&category), ActivityClass::Unread);
    }

    #[test]
    fn classification_depends_on_kind() {
        let mut category = Channel::from_payload(category_channel(1, "a"));
        let mut direct = Channel::from_payload(direct_message_channel(2, "b"));
        category.tracking.unread_count = 1;
        direct.tracking.unread_count = 1;
        assert_eq!(activity_class(&category), ActivityClass::Unread);
        assert_eq!(activity_class(&direct), ActivityClass::Urgent);
    }
}
