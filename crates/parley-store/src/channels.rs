//! The channel cache: find-or-fetch, upsert, follow/unfollow and eviction.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use parley_shared::payloads::{ChannelPayload, MembershipPayload};
use parley_shared::ChannelId;

use crate::api::ChatApi;
use crate::error::{Result, StoreError};
use crate::models::Channel;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Whether a cache miss may fall back to the REST collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lookup {
    CacheOnly,
    #[default]
    FetchIfMissing,
}

/// Change notifications for observers of the channel cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreUpdate {
    Stored(ChannelId),
    MembershipChanged(ChannelId),
    Removed(ChannelId),
}

/// Starts and stops per-channel bus subscriptions on behalf of the store.
///
/// Implemented by the dispatch layer; the store only asks for the topic of a
/// channel to be opened (from the channel's resume cursor) or closed.
pub trait ChannelSubscriptions: Send {
    fn start_channel_subscription(&mut self, channel: &Channel);
    fn stop_channel_subscription(&mut self, channel_id: ChannelId);
}

/// Cache of every channel known to this client.
pub struct ChannelStore {
    channels: HashMap<ChannelId, Channel>,
    updates: broadcast::Sender<StoreUpdate>,
}

impl ChannelStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            channels: HashMap::new(),
            updates,
        }
    }

    /// Observe cache changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    fn notify(&self, update: StoreUpdate) {
        // No observers is fine.
        let _ = self.updates.send(update);
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.channels.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.values_mut()
    }

    // ------------------------------------------------------------------
    // Upsert
    // ------------------------------------------------------------------

    /// Cache `payload` unless the channel is already cached.
    ///
    /// The cached entity wins, except that its resume cursor is taken from
    /// the payload when it has none yet. Storing the same id twice is
    /// idempotent.
    pub fn store(&mut self, payload: ChannelPayload) -> &mut Channel {
        self.upsert(payload, false)
    }

    /// Cache `payload`, discarding any cached entity with the same id.
    pub fn replace(&mut self, payload: ChannelPayload) -> &mut Channel {
        self.upsert(payload, true)
    }

    fn upsert(&mut self, payload: ChannelPayload, replace: bool) -> &mut Channel {
        let id = payload.id;
        self.notify(StoreUpdate::Stored(id));

        match self.channels.entry(id) {
            Entry::Occupied(mut entry) => {
                if replace {
                    entry.insert(Channel::from_payload(payload));
                } else {
                    let cursor = payload.meta.message_bus_last_ids.channel_message_bus_last_id;
                    let cached = entry.get_mut();
                    if cached.last_seen_sequence_id.is_none() {
                        cached.last_seen_sequence_id = cursor;
                    }
                }
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                debug!(channel = %id, "Caching channel");
                entry.insert(Channel::from_payload(payload))
            }
        }
    }

    // ------------------------------------------------------------------
    // Find
    // ------------------------------------------------------------------

    /// Look a channel up, fetching and caching it when `lookup` allows.
    ///
    /// A cache-only miss resolves to `Ok(None)` without side effects. A
    /// failed fetch is an `Err`.
    pub async fn find(
        &mut self,
        id: ChannelId,
        api: &dyn ChatApi,
        lookup: Lookup,
    ) -> Result<Option<&mut Channel>> {
        if self.channels.contains_key(&id) {
            return Ok(self.channels.get_mut(&id));
        }
        if lookup == Lookup::CacheOnly {
            return Ok(None);
        }

        debug!(channel = %id, "Fetching uncached channel");
        let payload = api.fetch_channel(id).await?;
        Ok(Some(self.store(payload)))
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub fn update_membership(&mut self, id: ChannelId, membership: MembershipPayload) -> bool {
        let Some(channel) = self.channels.get_mut(&id) else {
            return false;
        };
        channel.membership = membership.into();
        self.notify(StoreUpdate::MembershipChanged(id));
        true
    }

    /// Start the channel's subscription and, unless the user already follows
    /// it, ask the server to follow. A rejected follow stops the
    /// subscription again.
    pub async fn follow(
        &mut self,
        id: ChannelId,
        api: &dyn ChatApi,
        subscriptions: &mut dyn ChannelSubscriptions,
    ) -> Result<&mut Channel> {
        let channel = self.channels.get(&id).ok_or(StoreError::ChannelNotCached(id))?;
        subscriptions.start_channel_subscription(channel);

        if !channel.membership.following {
            let membership = match api.follow_channel(id).await {
                Ok(membership) => membership,
                Err(e) => {
                    subscriptions.stop_channel_subscription(id);
                    return Err(e.into());
                }
            };
            info!(channel = %id, "Followed channel");
            // The channel may have been evicted while the request was in flight.
            if !self.update_membership(id, membership) {
                subscriptions.stop_channel_subscription(id);
                return Err(StoreError::ChannelNotCached(id));
            }
        }

        self.channels
            .get_mut(&id)
            .ok_or(StoreError::ChannelNotCached(id))
    }

    /// Stop the channel's subscription, ask the server to unfollow, and evict
    /// the channel. On failure the subscription is restarted from the
    /// channel's cursor and the cache is left untouched.
    pub async fn unfollow(
        &mut self,
        id: ChannelId,
        api: &dyn ChatApi,
        subscriptions: &mut dyn ChannelSubscriptions,
    ) -> Result<Option<Channel>> {
        subscriptions.stop_channel_subscription(id);

        match api.unfollow_channel(id).await {
            Ok(membership) => {
                info!(channel = %id, "Unfollowed channel");
                let mut evicted = self.evict(id);
                if let Some(channel) = evicted.as_mut() {
                    channel.membership = membership.into();
                }
                Ok(evicted)
            }
            Err(e) => {
                warn!(channel = %id, error = %e, "Unfollow failed, resuming subscription");
                if let Some(channel) = self.channels.get(&id) {
                    subscriptions.start_channel_subscription(channel);
                }
                Err(e.into())
            }
        }
    }

    /// Stop the channel's subscription and evict it from the cache.
    pub fn remove(
        &mut self,
        id: ChannelId,
        subscriptions: &mut dyn ChannelSubscriptions,
    ) -> Option<Channel> {
        subscriptions.stop_channel_subscription(id);
        self.evict(id)
    }

    fn evict(&mut self, id: ChannelId) -> Option<Channel> {
        let removed = self.channels.remove(&id);
        if removed.is_some() {
            debug!(channel = %id, "Evicted channel");
            self.notify(StoreUpdate::Removed(id));
        }
        removed
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}
