//! The sync engine: one task owning every store, fed by one envelope queue.
//!
//! Each envelope is dispatched to completion before the next one is pulled,
//! so per-topic ordering is the queue order. Handlers that have to fetch
//! from the REST collaborator re-check after the fetch that their topic is
//! still subscribed and their entity still cached.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use parley_shared::payloads::SendMessageRequest;
use parley_shared::protocol::BusEnvelope;
use parley_shared::{ChannelId, MessageId, StagedId, ThreadId, Topic, UserId};
use parley_store::{
    Channel, ChannelStore, ChatApi, Lookup, StoreError, TrackingAggregator, TrackingTotals,
};

use crate::bus::{SubscriptionRegistry, TopicHandler, TransportCommand};
use crate::error::{ClientError, Result};
use crate::notifications::{ClientNotification, Notifier};
use crate::staged::{self, Draft};

pub struct SyncEngine {
    pub(crate) api: Arc<dyn ChatApi>,
    pub(crate) current_user: UserId,
    pub(crate) channels: ChannelStore,
    pub(crate) subscriptions: SubscriptionRegistry,
    pub(crate) tracking: TrackingAggregator,
    pub(crate) notifier: Notifier,
    pub(crate) has_threads: bool,
}

impl SyncEngine {
    pub fn new(api: Arc<dyn ChatApi>, current_user: UserId) -> Self {
        Self {
            api,
            current_user,
            channels: ChannelStore::new(),
            subscriptions: SubscriptionRegistry::new(),
            tracking: TrackingAggregator::new(),
            notifier: Notifier::default(),
            has_threads: false,
        }
    }

    /// Forward subscribe/unsubscribe commands to the bus transport.
    pub fn with_transport(mut self, transport: mpsc::UnboundedSender<TransportCommand>) -> Self {
        self.subscriptions = SubscriptionRegistry::with_transport(transport);
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn current_user(&self) -> UserId {
        self.current_user
    }

    pub fn channels(&self) -> &ChannelStore {
        &self.channels
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn totals(&self) -> TrackingTotals {
        self.tracking.current()
    }

    pub fn watch_totals(&self) -> watch::Receiver<TrackingTotals> {
        self.tracking.subscribe()
    }

    /// Whether the server reported that the user takes part in any thread.
    pub fn has_threads(&self) -> bool {
        self.has_threads
    }

    pub(crate) fn publish_totals(&self) {
        if self.tracking.publish(&self.channels) {
            self.notifier
                .notify(ClientNotification::TrackingChanged(self.tracking.current()));
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Load the user's channels, apply their tracking snapshot and open
    /// the user-state topic plus every followed channel's topic.
    pub async fn bootstrap(&mut self) -> Result<()> {
        let response = self.api.list_my_channels().await?;

        let payloads = response
            .public_channels
            .into_iter()
            .chain(response.direct_message_channels);
        for payload in payloads {
            self.channels.store(payload);
        }
        self.tracking.apply_snapshot(&mut self.channels, &response.tracking);

        let user = self.current_user;
        self.subscriptions.subscribe(
            user.to_topic(),
            TopicHandler::UserState(user),
            response.meta.user_state_last_id,
        );
        for channel in self.channels.iter().filter(|c| c.membership.following) {
            self.subscriptions.subscribe(
                channel.topic(),
                TopicHandler::Channel(channel.id),
                channel.last_seen_sequence_id,
            );
        }

        info!(
            channels = self.channels.len(),
            topics = self.subscriptions.len(),
            "Bootstrap complete"
        );
        self.publish_totals();
        Ok(())
    }

    /// Pull envelopes until the queue closes.
    pub async fn run(&mut self, mut envelopes: mpsc::Receiver<BusEnvelope>) {
        info!("Sync engine started");
        while let Some(envelope) = envelopes.recv().await {
            self.dispatch(envelope).await;
        }
        warn!("Envelope queue closed, sync engine stopped");
    }

    /// Admit, route and apply one envelope. Never fails: errors are logged
    /// and the event dropped.
    pub async fn dispatch(&mut self, envelope: BusEnvelope) {
        debug!(
            topic = %envelope.topic,
            seq = envelope.sequence_id,
            kind = envelope.type_tag().unwrap_or("?"),
            "Dispatching"
        );
        let BusEnvelope {
            topic,
            sequence_id,
            payload,
        } = envelope;

        let Some(admitted) = self.subscriptions.accept(&topic, sequence_id) else {
            debug!(topic = %topic, seq = sequence_id, "Dropping event for unsubscribed topic");
            return;
        };

        if let Some(gap) = admitted.gap {
            warn!(
                topic = %topic,
                expected = gap.expected,
                received = gap.received,
                "Sequence gap detected"
            );
            self.notifier.notify(ClientNotification::Desync {
                topic,
                expected: gap.expected,
                received: gap.received,
            });
        }

        let result = match admitted.handler {
            TopicHandler::Channel(channel_id) => {
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    channel.last_seen_sequence_id = Some(sequence_id);
                }
                self.handle_channel_event(topic, channel_id, None, &payload).await
            }
            TopicHandler::Thread(channel_id, thread_id) => {
                self.handle_channel_event(topic, channel_id, Some(thread_id), &payload)
                    .await
            }
            TopicHandler::UserState(_) => self.handle_user_state_event(&payload),
        };

        if let Err(e) = result {
            warn!(topic = %topic, seq = sequence_id, error = %e, "Event dropped");
        }
        self.publish_totals();
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    pub async fn find_channel(
        &mut self,
        id: ChannelId,
        lookup: Lookup,
    ) -> Result<Option<&Channel>> {
        let api = Arc::clone(&self.api);
        let found = self.channels.find(id, api.as_ref(), lookup).await?;
        Ok(found.map(|channel| &*channel))
    }

    /// Follow a channel (fetching it first if needed) and open its topic.
    pub async fn follow(&mut self, id: ChannelId) -> Result<()> {
        let api = Arc::clone(&self.api);
        self.channels
            .find(id, api.as_ref(), Lookup::FetchIfMissing)
            .await?;
        self.channels
            .follow(id, api.as_ref(), &mut self.subscriptions)
            .await?;
        self.publish_totals();
        Ok(())
    }

    pub async fn unfollow(&mut self, id: ChannelId) -> Result<Option<Channel>> {
        let api = Arc::clone(&self.api);
        let evicted = self
            .channels
            .unfollow(id, api.as_ref(), &mut self.subscriptions)
            .await?;
        self.publish_totals();
        Ok(evicted)
    }

    /// Evict a channel locally without telling the server.
    pub fn remove(&mut self, id: ChannelId) -> Option<Channel> {
        let removed = self.channels.remove(id, &mut self.subscriptions);
        self.publish_totals();
        removed
    }

    /// Tell the server everything up to `message_id` was read, then clear
    /// the channel's counters locally.
    pub async fn mark_read(&mut self, id: ChannelId, message_id: MessageId) -> Result<()> {
        if let Err(e) = self.api.mark_read(id, message_id).await {
            error!(channel = %id, message = %message_id, error = %e, "Mark read failed");
            return Err(e.into());
        }
        if let Some(channel) = self.channels.get_mut(id) {
            channel.mark_read(message_id);
        }
        self.publish_totals();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Threads
    // ------------------------------------------------------------------

    /// Find (or fetch) a thread and open its topic.
    pub async fn open_thread(&mut self, channel_id: ChannelId, thread_id: ThreadId) -> Result<()> {
        let api = Arc::clone(&self.api);
        let channel = self
            .channels
            .find(channel_id, api.as_ref(), Lookup::FetchIfMissing)
            .await?
            .ok_or(StoreError::ChannelNotCached(channel_id))?;
        let thread = channel
            .threads_mut()
            .find(thread_id, api.as_ref(), Lookup::FetchIfMissing)
            .await?
            .ok_or(StoreError::ThreadNotCached {
                channel: channel_id,
                thread: thread_id,
            })?;

        let topic = thread.topic();
        self.subscriptions
            .subscribe(topic, TopicHandler::Thread(channel_id, thread_id), None);
        Ok(())
    }

    pub fn close_thread(&mut self, channel_id: ChannelId, thread_id: ThreadId) -> bool {
        self.subscriptions
            .unsubscribe(&Topic::Thread(channel_id, thread_id))
    }

    /// Close every thread topic of a channel and drop its thread cache.
    pub fn reset_threads(&mut self, channel_id: ChannelId) {
        self.subscriptions.unsubscribe_threads(channel_id);
        if let Some(channel) = self.channels.get_mut(channel_id) {
            channel.threads_mut().reset();
        }
        self.publish_totals();
    }

    // ------------------------------------------------------------------
    // Composing
    // ------------------------------------------------------------------

    /// Stage a message locally and post it. The echo stays in the list
    /// either way; on failure it carries the error and can be resent.
    pub async fn send_message(&mut self, draft: Draft) -> Result<StagedId> {
        let channel_id = draft.channel_id;
        let channel = self
            .channels
            .get_mut(channel_id)
            .ok_or(StoreError::ChannelNotCached(channel_id))?;

        let staged_id = StagedId::new();
        let list = channel.message_list_mut(draft.thread_id);
        if !staged::stage(list, staged_id.clone(), self.current_user, &draft) {
            return Err(ClientError::DuplicateStagedId(staged_id));
        }

        let request = SendMessageRequest {
            message: draft.content,
            staged_id: staged_id.clone(),
            thread_id: draft.thread_id,
            in_reply_to_id: draft.in_reply_to_id,
            upload_ids: draft.upload_ids,
        };
        self.post(channel_id, request).await?;
        Ok(staged_id)
    }

    /// Resend a failed staged message under the same staged id.
    pub async fn resend(&mut self, channel_id: ChannelId, staged_id: &StagedId) -> Result<()> {
        let unknown = || ClientError::UnknownStagedMessage {
            channel: channel_id,
            staged_id: staged_id.clone(),
        };
        let echo = self
            .channels
            .get_mut(channel_id)
            .and_then(|channel| channel.find_staged_mut(staged_id))
            .ok_or_else(unknown)?;

        echo.error = None;
        let request = SendMessageRequest {
            message: echo.content.clone(),
            staged_id: staged_id.clone(),
            thread_id: echo.thread_id,
            in_reply_to_id: echo.in_reply_to_id,
            upload_ids: echo.upload_ids.clone(),
        };
        self.post(channel_id, request).await
    }

    async fn post(&mut self, channel_id: ChannelId, request: SendMessageRequest) -> Result<()> {
        match self.api.send_message(channel_id, &request).await {
            Ok(response) => {
                debug!(
                    channel = %channel_id,
                    staged = %request.staged_id,
                    message = ?response.message_id,
                    "Message accepted"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    channel = %channel_id,
                    staged = %request.staged_id,
                    error = %e,
                    "Send failed"
                );
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    staged::mark_failed(channel, &request.staged_id, e.to_string());
                }
                self.notifier.notify(ClientNotification::SendFailed {
                    channel_id,
                    staged_id: request.staged_id.clone(),
                    error: e.to_string(),
                });
                Err(ClientError::SendFailed {
                    staged_id: request.staged_id,
                    source: e,
                })
            }
        }
    }
}
