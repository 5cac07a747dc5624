//! Aggregate unread/mention counters derived from the channel cache.
//!
//! Totals are always recomputed from the per-entity `tracking` values, so
//! applying the same snapshot twice, or a delta followed by a snapshot,
//! never double counts.

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use parley_shared::payloads::TrackingSnapshot;
use parley_shared::protocol::TrackingDelta;

use crate::channels::ChannelStore;
use crate::models::Tracking;

/// Global counters shown by badges and the window title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackingTotals {
    pub public_channel_unread_count: u32,
    pub public_channel_mention_count: u32,
    pub direct_message_unread_count: u32,
    pub direct_message_mention_count: u32,
    pub watched_threads_unread_count: u32,
    /// Public mentions + direct-message unreads + watched-thread unreads.
    pub all_channel_urgent_count: u32,
    pub has_unread_threads: bool,
}

impl TrackingTotals {
    /// Sum the counters of every followed channel.
    ///
    /// Muted channels contribute mentions and watched-thread unreads but
    /// never plain unread counts.
    pub fn compute(store: &ChannelStore) -> Self {
        let mut totals = Self::default();

        for channel in store.iter().filter(|c| c.membership.following) {
            let t = &channel.tracking;
            let unread = if channel.membership.muted { 0 } else { t.unread_count };

            if channel.is_direct_message() {
                totals.direct_message_unread_count =
                    totals.direct_message_unread_count.saturating_add(unread);
                totals.direct_message_mention_count =
                    totals.direct_message_mention_count.saturating_add(t.mention_count);
            } else {
                totals.public_channel_unread_count =
                    totals.public_channel_unread_count.saturating_add(unread);
                totals.public_channel_mention_count =
                    totals.public_channel_mention_count.saturating_add(t.mention_count);
            }
            totals.watched_threads_unread_count = totals
                .watched_threads_unread_count
                .saturating_add(t.watched_threads_unread_count);

            if channel.unread_threads_since_last_viewed > 0
                || channel.threads().unread_threads_count() > 0
            {
                totals.has_unread_threads = true;
            }
        }

        totals.all_channel_urgent_count = totals
            .public_channel_mention_count
            .saturating_add(totals.direct_message_unread_count)
            .saturating_add(totals.watched_threads_unread_count);
        totals
    }
}

/// Publishes [`TrackingTotals`] to any number of observers.
pub struct TrackingAggregator {
    sender: watch::Sender<TrackingTotals>,
}

impl TrackingAggregator {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(TrackingTotals::default());
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackingTotals> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> TrackingTotals {
        *self.sender.borrow()
    }

    /// Recompute totals and notify observers if anything changed. Returns
    /// whether the totals changed.
    pub fn publish(&self, store: &ChannelStore) -> bool {
        let totals = TrackingTotals::compute(store);
        self.sender.send_if_modified(|current| {
            if *current == totals {
                return false;
            }
            *current = totals;
            true
        })
    }

    /// Overwrite the counters of every cached channel and thread present in
    /// `snapshot`. Entities absent from the cache are skipped.
    pub fn apply_snapshot(&self, store: &mut ChannelStore, snapshot: &TrackingSnapshot) {
        let mut applied = 0usize;

        for (channel_id, counts) in &snapshot.channel_tracking {
            if let Some(channel) = store.get_mut(*channel_id) {
                channel.tracking.set(counts);
                applied += 1;
            }
        }

        for (thread_id, payload) in &snapshot.thread_tracking {
            let thread = store
                .get_mut(payload.channel_id)
                .and_then(|c| c.threads_mut().get_mut(*thread_id));
            if let Some(thread) = thread {
                thread.tracking.set(&payload.counts);
                applied += 1;
            }
        }

        debug!(
            channels = snapshot.channel_tracking.len(),
            threads = snapshot.thread_tracking.len(),
            applied,
            "Applied tracking snapshot"
        );
    }

    /// Overwrite one channel's counters, and its thread's when the delta
    /// carries thread tracking. Returns false when the channel is not cached.
    pub fn apply_delta(&self, store: &mut ChannelStore, delta: &TrackingDelta) -> bool {
        let Some(channel) = store.get_mut(delta.channel_id) else {
            debug!(channel = %delta.channel_id, "Tracking delta for uncached channel");
            return false;
        };
        channel.tracking.set(&delta.counts);

        if let (Some(thread_id), Some(counts)) = (delta.thread_id, delta.thread_tracking.as_ref()) {
            if let Some(thread) = channel.threads_mut().get_mut(thread_id) {
                thread.tracking = Tracking::from_counts(counts);
            }
        }
        true
    }
}

impl Default for TrackingAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::testing::{category_channel, direct_message_channel, thread_payload};
    use parley_shared::payloads::{ThreadTrackingPayload, TrackingCounts};
    use parley_shared::types::NotificationLevel;
    use parley_shared::{ChannelId, ThreadId};

    fn counts(unread: i64, mention: i64, watched: i64) -> TrackingCounts {
        TrackingCounts {
            unread_count: unread,
            mention_count: mention,
            watched_threads_unread_count: watched,
        }
    }

    fn store() -> ChannelStore {
        let mut store = ChannelStore::new();
        let mut public = category_channel(1, "general");
        public.current_user_membership.following = true;
        let mut direct = direct_message_channel(2, "bob");
        direct.current_user_membership.following = true;
        store.store(public);
        store.store(direct);
        store
    }

    #[test]
    fn delta_then_snapshot_yields_snapshot_values() {
        let mut store = store();
        let aggregator = TrackingAggregator::new();

        aggregator.apply_delta(
            &mut store,
            &TrackingDelta {
                channel_id: ChannelId(1),
                thread_id: None,
                counts: counts(4, 1, 0),
                thread_tracking: None,
            },
        );
        let snapshot = TrackingSnapshot {
            channel_tracking: HashMap::from([(ChannelId(1), counts(2, 0, 0))]),
            thread_tracking: HashMap::new(),
        };
        aggregator.apply_snapshot(&mut store, &snapshot);
        aggregator.apply_snapshot(&mut store, &snapshot);

        assert_eq!(store.get(ChannelId(1)).unwrap().tracking.unread_count, 2);
        assert!(aggregator.publish(&store));
        assert_eq!(aggregator.current().public_channel_unread_count, 2);
        assert_eq!(aggregator.current().public_channel_mention_count, 0);
    }

    #[test]
    fn totals_split_by_channel_kind() {
        let mut store = store();
        store.get_mut(ChannelId(1)).unwrap().tracking = Tracking::from_counts(&counts(3, 2, 1));
        store.get_mut(ChannelId(2)).unwrap().tracking = Tracking::from_counts(&counts(5, 1, 0));

        let totals = TrackingTotals::compute(&store);
        assert_eq!(totals.public_channel_unread_count, 3);
        assert_eq!(totals.public_channel_mention_count, 2);
        assert_eq!(totals.direct_message_unread_count, 5);
        assert_eq!(totals.direct_message_mention_count, 1);
        assert_eq!(totals.watched_threads_unread_count, 1);
        assert_eq!(totals.all_channel_urgent_count, 2 + 5 + 1);
        assert!(!totals.has_unread_threads);
    }

    #[test]
    fn muted_and_unfollowed_channels_do_not_count_unreads() {
        let mut store = store();
        let public = store.get_mut(ChannelId(1)).unwrap();
        public.membership.muted = true;
        public.tracking = Tracking::from_counts(&counts(3, 1, 0));
        let direct = store.get_mut(ChannelId(2)).unwrap();
        direct.membership.following = false;
        direct.tracking = Tracking::from_counts(&counts(9, 9, 9));

        let totals = TrackingTotals::compute(&store);
        assert_eq!(totals.public_channel_unread_count, 0);
        assert_eq!(totals.public_channel_mention_count, 1);
        assert_eq!(totals.direct_message_unread_count, 0);
    }

    #[test]
    fn snapshot_reaches_cached_threads_only() {
        let mut store = store();
        store
            .get_mut(ChannelId(1))
            .unwrap()
            .threads_mut()
            .store(thread_payload(1, 7, Some(NotificationLevel::Tracking)));

        let snapshot = TrackingSnapshot {
            channel_tracking: HashMap::new(),
            thread_tracking: HashMap::from([
                (
                    ThreadId(7),
                    ThreadTrackingPayload {
                        channel_id: ChannelId(1),
                        counts: counts(2, 0, 0),
                    },
                ),
                (
                    ThreadId(8),
                    ThreadTrackingPayload {
                        channel_id: ChannelId(1),
                        counts: counts(6, 0, 0),
                    },
                ),
            ]),
        };
        TrackingAggregator::new().apply_snapshot(&mut store, &snapshot);

        let threads = store.get(ChannelId(1)).unwrap().threads();
        assert_eq!(threads.get(ThreadId(7)).unwrap().tracking.unread_count, 2);
        assert!(threads.get(ThreadId(8)).is_none());
        assert!(TrackingTotals::compute(&store).has_unread_threads);
    }

    #[test]
    fn delta_for_unknown_channel_is_ignored() {
        let mut store = store();
        let applied = TrackingAggregator::new().apply_delta(
            &mut store,
            &TrackingDelta {
                channel_id: ChannelId(42),
                thread_id: None,
                counts: counts(1, 1, 1),
                thread_tracking: None,
            },
        );
        assert!(!applied);
    }

    #[test]
    fn publish_only_notifies_on_change() {
        let mut store = store();
        let aggregator = TrackingAggregator::new();
        let mut rx = aggregator.subscribe();

        assert!(!aggregator.publish(&store));
        assert!(!rx.has_changed().unwrap());

        store.get_mut(ChannelId(2)).unwrap().tracking.unread_count = 1;
        assert!(aggregator.publish(&store));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().direct_message_unread_count, 1);
    }
}
