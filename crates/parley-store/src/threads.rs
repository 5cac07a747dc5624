//! Per-channel cache of [`Thread`] entities.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::debug;

use parley_shared::payloads::ThreadPayload;
use parley_shared::{ChannelId, MessageId, ThreadId};

use crate::api::ChatApi;
use crate::channels::Lookup;
use crate::error::Result;
use crate::models::{Thread, ThreadActivity};

/// Threads of a single channel. Owned by that channel; dropping or
/// resetting it evicts every thread.
#[derive(Debug)]
pub struct ThreadStore {
    channel_id: ChannelId,
    threads: HashMap<ThreadId, Thread>,
}

impl ThreadStore {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            threads: HashMap::new(),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(&id)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(&id)
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.threads.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Thread> {
        self.threads.values_mut()
    }

    /// Insert `payload` unless the thread is already cached, in which case
    /// the cached entity wins.
    pub fn store(&mut self, payload: ThreadPayload) -> &mut Thread {
        self.threads
            .entry(payload.id)
            .or_insert_with(|| Thread::from_payload(payload))
    }

    /// Insert `payload`, discarding any cached entity with the same id.
    pub fn replace(&mut self, payload: ThreadPayload) -> &mut Thread {
        match self.threads.entry(payload.id) {
            Entry::Occupied(mut entry) => {
                entry.insert(Thread::from_payload(payload));
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(Thread::from_payload(payload)),
        }
    }

    /// Look a thread up, fetching it from `api` when `lookup` allows.
    ///
    /// A cache-only miss is `Ok(None)`: not an error.
    pub async fn find(
        &mut self,
        id: ThreadId,
        api: &dyn ChatApi,
        lookup: Lookup,
    ) -> Result<Option<&mut Thread>> {
        if self.threads.contains_key(&id) {
            return Ok(self.threads.get_mut(&id));
        }
        if lookup == Lookup::CacheOnly {
            return Ok(None);
        }

        debug!(channel = %self.channel_id, thread = %id, "Fetching uncached thread");
        let payload = api.fetch_thread(self.channel_id, id).await?;
        Ok(Some(self.store(payload)))
    }

    pub fn remove(&mut self, id: ThreadId) -> Option<Thread> {
        self.threads.remove(&id)
    }

    /// Drop every cached thread (e.g. when the user switches channels).
    pub fn reset(&mut self) {
        self.threads.clear();
    }

    /// Apply a new reply to a cached thread. `None` when the thread is not
    /// cached.
    pub fn record_new_message(
        &mut self,
        id: ThreadId,
        message_id: MessageId,
        from_current_user: bool,
    ) -> Option<ThreadActivity> {
        self.threads
            .get_mut(&id)
            .map(|thread| thread.record_new_message(message_id, from_current_user))
    }

    /// Number of cached threads with unread replies.
    pub fn unread_threads_count(&self) -> usize {
        self.threads
            .values()
            .filter(|t| t.tracking.unread_count > 0 || t.tracking.watched_threads_unread_count > 0)
            .count()
    }
}
